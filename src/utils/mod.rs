// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Utility modules

pub mod duration;

pub use duration::{format_duration, parse_duration};
