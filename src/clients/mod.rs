pub mod broker;
pub mod email;
pub mod memory;
pub mod publisher;
pub mod push;
pub mod rbmq;
