// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Configuration types
//!
//! Pipeline declarations, source/version values, base type defaults and
//! engine settings.

mod defaults;
mod definition;
mod settings;
mod source;

pub use defaults::{BaseTypeDefaults, DefaultsTable};
pub use definition::*;
pub use settings::Settings;
pub use source::{Params, Source, Version};
