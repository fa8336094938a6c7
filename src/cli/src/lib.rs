//! jmanager CLI - declarative FreeBSD jails on ZFS.

pub mod commands;
pub mod output;
