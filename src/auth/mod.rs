pub mod device_code;
pub mod gateway;
pub mod jwt;
pub mod password;
pub mod refresh;

pub use gateway::AuthGateway;
