// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Kernel abstraction traits

pub mod kernel;

pub use kernel::Kernel;
