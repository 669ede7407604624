#![forbid(unsafe_code)]

pub mod catalog;
pub mod mirror;
pub mod repository;
pub mod sqlite;

pub use catalog::FileCatalog;
pub use mirror::FileMirror;
