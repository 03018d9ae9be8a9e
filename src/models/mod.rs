pub mod k8s;
pub mod kind;
pub mod names;
pub mod views;
