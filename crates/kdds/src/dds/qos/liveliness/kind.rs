// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

/// Liveliness assertion mechanism.
///
/// Ordered from weakest to strongest commitment: a writer offering a
/// stronger kind satisfies a reader requesting a weaker one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LivelinessKind {
    /// The participant's PMD heartbeats keep the writer alive.
    #[default]
    Automatic,
    /// Any assert or write under the owning participant renews.
    ManualByParticipant,
    /// Only an assert or write on this exact writer renews.
    ManualByTopic,
}
