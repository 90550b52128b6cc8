pub mod collapse;
pub mod expand;
pub mod init;
pub mod queue;
pub mod show;
pub mod submit;
