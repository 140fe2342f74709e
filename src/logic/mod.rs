pub mod config;
pub mod cooldown;
pub mod history;
pub mod hung;
pub mod logwriter;
pub mod measure;
pub mod monitor;
pub mod notifier;
pub mod policy;
pub mod shutdown;
pub mod terminate;
