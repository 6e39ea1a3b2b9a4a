//! Platform layer over the task engine: configuration, logging, referral
//! and withdrawal management, account moderation, and the composition root
//! that wires them together.
//!
//! ## Module structure
//!
//! - **config**: TOML configuration (API endpoint, shortlink networks,
//!   task catalog entries, withdrawal floor, logging)
//! - **logging**: tracing-subscriber initialization
//! - **platform**: composition root ([`Platform`])
//! - **referral**: referral codes and referral-attributed signups
//! - **withdraw**: withdrawal requests and admin review
//! - **moderation**: anomaly flagging, status overrides, dashboard totals

pub mod config;
pub mod logging;
pub mod moderation;
pub mod platform;
pub mod referral;
pub mod withdraw;

pub use config::{AppConfig, LoggingConfig};
pub use logging::init_logging;
pub use moderation::{ModerationManager, PlatformStats, TaskRanking};
pub use platform::Platform;
pub use referral::{NewAccount, ReferralManager, ReferralStats};
pub use withdraw::WithdrawalManager;
