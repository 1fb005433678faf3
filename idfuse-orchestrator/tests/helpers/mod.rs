//! Test Helper Utilities
//!
//! Shared utilities for testing idfuse-orchestrator

#![allow(dead_code)]

pub mod db_utils;
pub mod fake_backends;
pub mod multipart;

pub use db_utils::create_test_db;
pub use fake_backends::{
    spawn_context_backend, spawn_server, spawn_verification_backend, FakeContext, FakeVerifier,
};
pub use multipart::{multipart_body, MultipartPart, BOUNDARY};

/// Smallest byte strings that pass the upload type check
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01";
pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
