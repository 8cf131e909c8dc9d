//! Built-in providers.

pub mod conda_env;
pub mod download;
pub mod env_var;
pub mod redis;

pub use conda_env::CondaEnvProvider;
pub use download::DownloadProvider;
pub use env_var::EnvVarProvider;
pub use redis::RedisProvider;
