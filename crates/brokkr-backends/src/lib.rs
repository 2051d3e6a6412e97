//! # brokkr-backends
//!
//! The two lifecycle backends of Brokkr and the capability trait they
//! share. Callers open an account from its configuration and receive a
//! `Box<dyn DbmsLifecycle>`; which backend answers is decided solely by
//! the configured account type.

pub mod local;
pub mod remote;
pub mod traits;

pub use local::LocalAccount;
pub use remote::RemoteAccount;
pub use traits::DbmsLifecycle;

use brokkr_core::config::{AccountConfig, AccountType};
use brokkr_core::Result;

/// Open the backend an account configuration selects
pub fn open_account(config: AccountConfig) -> Result<Box<dyn DbmsLifecycle>> {
    match config.account_type {
        AccountType::Local => Ok(Box::new(LocalAccount::new(config)?)),
        AccountType::Remote => Ok(Box::new(RemoteAccount::new(config)?)),
    }
}
