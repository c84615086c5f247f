pub mod incoming;
pub mod psm;
pub mod response;
