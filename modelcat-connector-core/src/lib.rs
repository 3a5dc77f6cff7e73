#![doc = "modelcat-connector-core: dataset validation and upload logic for modelcat-connector."]

//! Everything the connector does lives here; the CLI crate only parses
//! arguments, wires up logging and provides the HTTP and terminal
//! implementations of the [`contract`] traits.
//!
//! # Flow
//! 1. [`setup::SetupWizard`] stores a [`config::PlatformConfig`] and an AWS CLI profile.
//! 2. [`validate::DatasetValidator`] checks a dataset directory; a clean run is
//!    signed with [`hashing::hash_dataset`] and written by [`signature::write_log`].
//! 3. [`upload::DatasetUploader`] re-hashes, compares against the signature,
//!    syncs to object storage and registers the dataset.

pub mod config;
pub mod contract;
pub mod hashing;
pub mod schemas;
pub mod setup;
pub mod signature;
pub mod storage;
pub mod upload;
pub mod validate;
pub mod walk;
