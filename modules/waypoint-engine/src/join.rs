//! Joining frames across a rule's `when` patterns within one run.
//!
//! Each pattern index owns a pending slot. A rule fires once every slot can
//! contribute a frame and the contributions agree on shared variables. The
//! frames that took part in a firing are consumed, so one set of completions
//! fires a rule at most once; frames that joined nothing stay pending until
//! the run ends.

use crate::frame::Frame;

/// A frame produced by matching the completion with sequence `seq`.
#[derive(Debug, Clone)]
struct Pending {
    seq: i64,
    frame: Frame,
}

/// A fully joined frame and the completions it was built from, one per slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Joined {
    pub frame: Frame,
    pub seqs: Vec<i64>,
}

/// Pending slots for one (rule, run) pair.
#[derive(Debug)]
pub struct JoinState {
    slots: Vec<Vec<Pending>>,
}

impl JoinState {
    pub fn new(patterns: usize) -> Self {
        Self {
            slots: vec![Vec::new(); patterns],
        }
    }

    /// Offer a frame matched against pattern `index` by completion `seq`.
    ///
    /// Returns every joined combination the new frame completes. With a
    /// single pattern this is the frame itself.
    pub fn offer(&mut self, index: usize, seq: i64, frame: Frame) -> Vec<Joined> {
        let candidates: Vec<Vec<&Pending>> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, slot)| slot.iter().collect())
            .collect();

        let mut joined = vec![Joined {
            frame: frame.clone(),
            seqs: vec![seq],
        }];
        for slot in &candidates {
            joined = joined
                .iter()
                .flat_map(|partial| {
                    slot.iter().filter_map(move |pending| {
                        // One completion cannot satisfy two slots of the same firing.
                        if partial.seqs.contains(&pending.seq) {
                            return None;
                        }
                        let frame = partial.frame.merge(&pending.frame)?;
                        let mut seqs = partial.seqs.clone();
                        seqs.push(pending.seq);
                        Some(Joined { frame, seqs })
                    })
                })
                .collect();
            if joined.is_empty() {
                break;
            }
        }

        if joined.is_empty() {
            self.slots[index].push(Pending { seq, frame });
            return joined;
        }

        let consumed: Vec<i64> = joined.iter().flat_map(|j| j.seqs.iter().copied()).collect();
        for slot in &mut self.slots {
            slot.retain(|pending| !consumed.contains(&pending.seq));
        }
        joined
    }

    /// How many slots currently hold at least one frame.
    pub fn satisfied(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_empty()).count()
    }

    pub fn is_idle(&self) -> bool {
        self.satisfied() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::Vars;
    use serde_json::json;

    #[test]
    fn single_pattern_is_identity() {
        let [a] = Vars::new().many(["a"]);
        let mut state = JoinState::new(1);
        let frame = Frame::new().with(a, 1);

        let joined = state.offer(0, 10, frame.clone());
        assert_eq!(joined, vec![Joined { frame, seqs: vec![10] }]);
        assert!(state.is_idle());
    }

    #[test]
    fn two_patterns_wait_then_fire_once() {
        let [request, event, poll] = Vars::new().many(["request", "event", "poll"]);
        let mut state = JoinState::new(2);

        let first = state.offer(0, 1, Frame::new().with(request, "r").with(event, "e1"));
        assert!(first.is_empty());
        assert_eq!(state.satisfied(), 1);

        let second = state.offer(1, 2, Frame::new().with(poll, "p1"));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].seqs, vec![2, 1]);
        assert_eq!(second[0].frame.get(event), Some(&json!("e1")));
        assert_eq!(second[0].frame.get(poll), Some(&json!("p1")));

        // Consumed: a later completion for slot 1 has nothing to join with.
        assert!(state.offer(1, 3, Frame::new().with(poll, "p2")).is_empty());
    }

    #[test]
    fn shared_variable_mismatch_does_not_fire() {
        let [trip] = Vars::new().many(["trip"]);
        let mut state = JoinState::new(2);

        assert!(state.offer(0, 1, Frame::new().with(trip, "t1")).is_empty());
        assert!(state.offer(1, 2, Frame::new().with(trip, "t2")).is_empty());
        assert_eq!(state.satisfied(), 2);

        // The pending t1 frame is still available for a matching partner.
        let joined = state.offer(1, 3, Frame::new().with(trip, "t1"));
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].seqs, vec![3, 1]);
    }

    #[test]
    fn same_completion_cannot_fill_two_slots() {
        let [x] = Vars::new().many(["x"]);
        let mut state = JoinState::new(2);
        assert!(state.offer(0, 5, Frame::new().with(x, 1)).is_empty());
        assert!(state.offer(1, 5, Frame::new().with(x, 1)).is_empty());
    }
}
