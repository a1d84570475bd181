//! Password change filter backed by an identity manager (IdM).
//!
//! Before a password change the host asks [`filter::PasswordFilter`]
//! whether the new password meets the IdM policies; after the change it
//! tells IdM about it. Requests fail over across the configured IdM base
//! URLs with a bounded number of attempts each, so a single validation
//! blocks for at most `base URLs x attempts x timeout`.
//!
//! Availability is preferred over enforcement: until a configuration file
//! has been loaded successfully every change is approved and no
//! notification is sent.

pub mod config;
pub mod filter;
pub mod idm;
pub mod init;
