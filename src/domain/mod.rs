pub mod action;
pub mod connectivity;
pub mod draft;
pub mod status;
