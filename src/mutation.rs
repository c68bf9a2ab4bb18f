use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// How many settled mutations are kept for inspection.
const LOG_CAP: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MutationKind {
    MarkRead { id: i64 },
    MarkAllRead,
    Delete { id: i64 },
    DeleteAll,
}

/// Two-phase lifecycle of an optimistic change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationPhase {
    /// Applied locally, server call in flight.
    Pending,
    Confirmed,
    /// Server call failed; the local change stays until the next fetch.
    FailedKept,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mutation {
    pub seq: u64,
    #[serde(flatten)]
    pub kind: MutationKind,
    pub phase: MutationPhase,
    pub started_at: DateTime<Utc>,
}

/// Bounded record of recent optimistic mutations, oldest first.
#[derive(Debug, Default)]
pub struct MutationLog {
    next_seq: u64,
    entries: VecDeque<Mutation>,
}

impl MutationLog {
    pub fn begin(&mut self, kind: MutationKind) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        if self.entries.len() == LOG_CAP {
            self.entries.pop_front();
        }
        self.entries.push_back(Mutation {
            seq,
            kind,
            phase: MutationPhase::Pending,
            started_at: Utc::now(),
        });
        seq
    }

    /// Move a pending mutation to its final phase. Settling twice or settling
    /// an evicted entry is a no-op returning `None`.
    pub fn settle(&mut self, seq: u64, confirmed: bool) -> Option<&Mutation> {
        let entry = self.entries.iter_mut().find(|m| m.seq == seq)?;
        if entry.phase != MutationPhase::Pending {
            return None;
        }
        entry.phase = if confirmed {
            MutationPhase::Confirmed
        } else {
            MutationPhase::FailedKept
        };
        Some(entry)
    }

    pub fn get(&self, seq: u64) -> Option<&Mutation> {
        self.entries.iter().find(|m| m.seq == seq)
    }

    pub fn pending(&self) -> impl Iterator<Item = &Mutation> {
        self.entries
            .iter()
            .filter(|m| m.phase == MutationPhase::Pending)
    }

    pub fn entries(&self) -> impl Iterator<Item = &Mutation> {
        self.entries.iter()
    }
}
