pub mod cors;
pub mod operator;
pub mod request_id;
