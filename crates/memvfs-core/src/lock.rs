// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Whole-file advisory lock arbitration
//!
//! Every request resolves immediately to grant or deny. Nothing blocks and
//! nothing expires: a holder keeps its lock until it asks for `Unlock`.

use std::collections::BTreeSet;

use crate::{HandleId, LockOperation};

/// Lock state carried by every File node
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LockState {
    exclusive: Option<HandleId>,
    shared: BTreeSet<HandleId>,
}

impl LockState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `operation` on behalf of `requester`, returning whether it was granted.
    ///
    /// Whatever the requester held before is released first, which is what
    /// makes downgrade always succeed and upgrade succeed only for a sole
    /// shared holder.
    pub fn request(&mut self, requester: HandleId, operation: LockOperation) -> bool {
        if self.exclusive == Some(requester) {
            self.exclusive = None;
        } else {
            self.shared.remove(&requester);
        }

        match operation {
            LockOperation::Unlock => true,
            _ if self.exclusive.is_some() => false,
            LockOperation::Shared => {
                self.shared.insert(requester);
                true
            }
            LockOperation::Exclusive => {
                if !self.shared.is_empty() {
                    return false;
                }
                self.exclusive = Some(requester);
                true
            }
        }
    }

    pub fn exclusive_holder(&self) -> Option<HandleId> {
        self.exclusive
    }

    pub fn shared_holders(&self) -> impl Iterator<Item = HandleId> + '_ {
        self.shared.iter().copied()
    }

    pub fn is_locked(&self) -> bool {
        self.exclusive.is_some() || !self.shared.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: HandleId = HandleId(1);
    const B: HandleId = HandleId(2);

    #[test]
    fn test_shared_blocks_foreign_exclusive_until_unlock() {
        let mut state = LockState::new();
        assert!(state.request(A, LockOperation::Shared));
        assert!(!state.request(B, LockOperation::Exclusive));
        assert!(state.request(A, LockOperation::Unlock));
        assert!(state.request(B, LockOperation::Exclusive));
        assert_eq!(state.exclusive_holder(), Some(B));
    }

    #[test]
    fn test_two_shared_holders() {
        let mut state = LockState::new();
        assert!(state.request(A, LockOperation::Shared));
        assert!(state.request(B, LockOperation::Shared));
        assert!(!state.request(A, LockOperation::Exclusive));
        // The failed upgrade released A's shared hold
        assert_eq!(state.shared_holders().collect::<Vec<_>>(), vec![B]);
        assert!(state.request(B, LockOperation::Exclusive));
        assert_eq!(state.exclusive_holder(), Some(B));
    }

    #[test]
    fn test_unlock_then_exclusive_after_both_shared() {
        let mut state = LockState::new();
        assert!(state.request(A, LockOperation::Shared));
        assert!(state.request(B, LockOperation::Shared));
        assert!(!state.request(B, LockOperation::Exclusive));
        assert!(state.request(A, LockOperation::Unlock));
        assert!(state.request(B, LockOperation::Exclusive));
    }

    #[test]
    fn test_upgrade_as_sole_shared_holder() {
        let mut state = LockState::new();
        assert!(state.request(A, LockOperation::Shared));
        assert!(state.request(A, LockOperation::Exclusive));
        assert_eq!(state.exclusive_holder(), Some(A));
        assert_eq!(state.shared_holders().count(), 0);
    }

    #[test]
    fn test_downgrade_always_succeeds() {
        let mut state = LockState::new();
        assert!(state.request(A, LockOperation::Exclusive));
        assert!(!state.request(B, LockOperation::Shared));
        assert!(state.request(A, LockOperation::Shared));
        assert!(state.request(B, LockOperation::Shared));
        assert_eq!(state.exclusive_holder(), None);
    }

    #[test]
    fn test_unlock_without_hold_is_granted() {
        let mut state = LockState::new();
        assert!(state.request(A, LockOperation::Unlock));
        assert!(!state.is_locked());
    }

    #[test]
    fn test_exclusive_reacquire_by_holder() {
        let mut state = LockState::new();
        assert!(state.request(A, LockOperation::Exclusive));
        assert!(state.request(A, LockOperation::Exclusive));
        assert!(!state.request(B, LockOperation::Exclusive));
    }
}
