// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Fragment reassembly and sample reordering, per proxy writer.

mod defrag;
mod reorder;

pub use defrag::{Defrag, DEFAULT_MAX_IN_PROGRESS};
pub use reorder::{Reorder, ReorderMode, ReorderOutcome};
