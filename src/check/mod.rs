// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Check scheduling descriptors

mod plan;

pub use plan::{build_check_plan, check_interval, CheckPlan, Checkable, NEVER};
