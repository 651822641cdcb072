//! Problem resolution: memoized decisions and the decision-maker boundary.
//!
//! The engine asks an external decision-maker how to handle each problem,
//! synchronously, blocking the engine task. Decisions marked "remember"
//! are memoized per [`ProblemType`] and auto-applied for the remainder of
//! the run. A dismissed request (or a closed channel) counts as abort.

use std::collections::BTreeMap;
use std::sync::mpsc;

use crate::model::{MigrationProblem, ProblemType, Resolution};

// ---------------------------------------------------------------------------
// Decision / DecisionHandler
// ---------------------------------------------------------------------------

/// A decision-maker's answer for one problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decision {
    /// The chosen resolution.
    pub resolution: Resolution,
    /// Apply the same resolution to all later problems of this type.
    pub remember: bool,
}

/// The decision-maker boundary.
///
/// Callers receive the problem plus a snapshot of already-remembered
/// decisions so a UI can honor them without re-prompting, matching the
/// engine's own memoization. Returning `None` means the dialog was
/// dismissed without a choice, which the policy treats as abort.
pub trait DecisionHandler {
    fn decide(
        &mut self,
        problem: &MigrationProblem,
        remembered: &BTreeMap<ProblemType, Resolution>,
    ) -> Option<Decision>;
}

/// Answers every request with a fixed resolution. Used for unattended runs.
#[derive(Clone, Copy, Debug)]
pub struct FixedDecision(pub Resolution);

impl DecisionHandler for FixedDecision {
    fn decide(
        &mut self,
        _problem: &MigrationProblem,
        _remembered: &BTreeMap<ProblemType, Resolution>,
    ) -> Option<Decision> {
        Some(Decision {
            resolution: self.0,
            remember: false,
        })
    }
}

// ---------------------------------------------------------------------------
// ProblemResolutionPolicy
// ---------------------------------------------------------------------------

/// The applied resolution plus an optional note for the run's warnings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    /// What the engine should do with the item.
    pub resolution: Resolution,
    /// Warning text when the decision-maker misbehaved.
    pub note: Option<String>,
}

/// Memoized decision state for one run. Empty at run start.
#[derive(Debug, Default)]
pub struct ProblemResolutionPolicy {
    remembered: BTreeMap<ProblemType, Resolution>,
}

impl ProblemResolutionPolicy {
    /// Create a policy with no remembered decisions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The decisions remembered so far.
    #[must_use]
    pub const fn remembered(&self) -> &BTreeMap<ProblemType, Resolution> {
        &self.remembered
    }

    /// Resolve a problem, recording the resolution on it.
    ///
    /// A remembered decision for the problem's type is applied without
    /// consulting the handler. A resolution the problem type does not
    /// allow is rejected and treated as abort.
    pub fn resolve(
        &mut self,
        problem: &mut MigrationProblem,
        handler: &mut dyn DecisionHandler,
    ) -> Outcome {
        if let Some(&resolution) = self.remembered.get(&problem.problem_type) {
            problem.resolution = Some(resolution);
            problem.remembered = true;
            return Outcome {
                resolution,
                note: None,
            };
        }

        let Some(decision) = handler.decide(problem, &self.remembered) else {
            problem.resolution = Some(Resolution::Abort);
            return Outcome {
                resolution: Resolution::Abort,
                note: Some(format!(
                    "no decision received for '{}', aborting",
                    problem.problem_type
                )),
            };
        };

        if !problem.problem_type.allows(decision.resolution) {
            problem.resolution = Some(Resolution::Abort);
            return Outcome {
                resolution: Resolution::Abort,
                note: Some(format!(
                    "resolution '{}' is not allowed for '{}', aborting",
                    decision.resolution, problem.problem_type
                )),
            };
        }

        problem.resolution = Some(decision.resolution);
        problem.remembered = decision.remember;
        if decision.remember {
            self.remembered
                .insert(problem.problem_type, decision.resolution);
        }
        Outcome {
            resolution: decision.resolution,
            note: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Channel decision-maker
// ---------------------------------------------------------------------------

/// One pending decision request, delivered to the decision-maker side.
///
/// Dropping the request without responding counts as a dismissal.
#[derive(Debug)]
pub struct DecisionRequest {
    /// The problem to decide.
    pub problem: MigrationProblem,
    /// Snapshot of the engine's remembered decisions.
    pub remembered: BTreeMap<ProblemType, Resolution>,
    reply: mpsc::SyncSender<Option<Decision>>,
}

impl DecisionRequest {
    /// Send the decision back to the blocked engine task.
    pub fn respond(self, decision: Option<Decision>) {
        // A dropped engine side already counts as abort; nothing to do.
        let _ = self.reply.send(decision);
    }
}

/// Engine-side handler that forwards requests over a single-slot channel.
#[derive(Debug)]
pub struct ChannelDecisionMaker {
    tx: mpsc::SyncSender<DecisionRequest>,
}

impl DecisionHandler for ChannelDecisionMaker {
    fn decide(
        &mut self,
        problem: &MigrationProblem,
        remembered: &BTreeMap<ProblemType, Resolution>,
    ) -> Option<Decision> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let request = DecisionRequest {
            problem: problem.clone(),
            remembered: remembered.clone(),
            reply: reply_tx,
        };
        // A closed request channel means the decision-maker went away:
        // treated as abort, never a deadlock.
        if self.tx.send(request).is_err() {
            return None;
        }
        reply_rx.recv().ok().flatten()
    }
}

/// Create the engine-side handler and the decision-maker-side receiver.
///
/// The channel holds at most one pending request; the engine blocks until
/// the decision-maker responds or hangs up.
#[must_use]
pub fn decision_channel() -> (ChannelDecisionMaker, mpsc::Receiver<DecisionRequest>) {
    let (tx, rx) = mpsc::sync_channel(1);
    (ChannelDecisionMaker { tx }, rx)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProblemLocation;

    fn problem(problem_type: ProblemType) -> MigrationProblem {
        MigrationProblem::new(problem_type, ProblemLocation::default(), "test finding")
    }

    /// Counts invocations and replies with a scripted decision.
    struct Scripted {
        decision: Option<Decision>,
        calls: usize,
    }

    impl DecisionHandler for Scripted {
        fn decide(
            &mut self,
            _problem: &MigrationProblem,
            _remembered: &BTreeMap<ProblemType, Resolution>,
        ) -> Option<Decision> {
            self.calls += 1;
            self.decision
        }
    }

    #[test]
    fn remembered_decision_skips_the_handler() {
        let mut policy = ProblemResolutionPolicy::new();
        let mut handler = Scripted {
            decision: Some(Decision {
                resolution: Resolution::Skip,
                remember: true,
            }),
            calls: 0,
        };

        let mut first = problem(ProblemType::MissingRefExportXml);
        let outcome = policy.resolve(&mut first, &mut handler);
        assert_eq!(outcome.resolution, Resolution::Skip);
        assert_eq!(handler.calls, 1);

        let mut second = problem(ProblemType::MissingRefExportXml);
        let outcome = policy.resolve(&mut second, &mut handler);
        assert_eq!(outcome.resolution, Resolution::Skip);
        assert_eq!(handler.calls, 1, "handler must not be consulted again");
        assert!(second.remembered);
    }

    #[test]
    fn remember_false_keeps_prompting() {
        let mut policy = ProblemResolutionPolicy::new();
        let mut handler = Scripted {
            decision: Some(Decision {
                resolution: Resolution::Skip,
                remember: false,
            }),
            calls: 0,
        };
        policy.resolve(&mut problem(ProblemType::MissingRefExportXml), &mut handler);
        policy.resolve(&mut problem(ProblemType::MissingRefExportXml), &mut handler);
        assert_eq!(handler.calls, 2);
        assert!(policy.remembered().is_empty());
    }

    #[test]
    fn memoization_is_per_problem_type() {
        let mut policy = ProblemResolutionPolicy::new();
        let mut handler = Scripted {
            decision: Some(Decision {
                resolution: Resolution::Skip,
                remember: true,
            }),
            calls: 0,
        };
        policy.resolve(&mut problem(ProblemType::MissingRefExportXml), &mut handler);
        policy.resolve(&mut problem(ProblemType::MissingArchivBestandXml), &mut handler);
        assert_eq!(handler.calls, 2);
    }

    #[test]
    fn dismissal_counts_as_abort() {
        let mut policy = ProblemResolutionPolicy::new();
        let mut handler = Scripted {
            decision: None,
            calls: 0,
        };
        let mut p = problem(ProblemType::Other);
        let outcome = policy.resolve(&mut p, &mut handler);
        assert_eq!(outcome.resolution, Resolution::Abort);
        assert!(outcome.note.is_some());
        assert_eq!(p.resolution, Some(Resolution::Abort));
    }

    #[test]
    fn disallowed_resolution_is_rejected_as_abort() {
        let mut policy = ProblemResolutionPolicy::new();
        let mut handler = Scripted {
            decision: Some(Decision {
                resolution: Resolution::CopyAnyway,
                remember: true,
            }),
            calls: 0,
        };
        let mut p = problem(ProblemType::CustomerNoValidTestcases);
        let outcome = policy.resolve(&mut p, &mut handler);
        assert_eq!(outcome.resolution, Resolution::Abort);
        assert!(outcome.note.unwrap().contains("not allowed"));
        // The bad decision must not be memoized.
        assert!(policy.remembered().is_empty());
    }

    #[test]
    fn channel_round_trip() {
        let (mut handler, rx) = decision_channel();
        let responder = std::thread::spawn(move || {
            let request = rx.recv().unwrap();
            assert_eq!(request.problem.problem_type, ProblemType::MissingRefExportXml);
            request.respond(Some(Decision {
                resolution: Resolution::Skip,
                remember: false,
            }));
        });

        let decision = handler.decide(
            &problem(ProblemType::MissingRefExportXml),
            &BTreeMap::new(),
        );
        assert_eq!(
            decision,
            Some(Decision {
                resolution: Resolution::Skip,
                remember: false,
            })
        );
        responder.join().unwrap();
    }

    #[test]
    fn closed_channel_is_treated_as_abort() {
        let (mut handler, rx) = decision_channel();
        drop(rx);
        let decision = handler.decide(&problem(ProblemType::Other), &BTreeMap::new());
        assert!(decision.is_none());
    }

    #[test]
    fn dropped_request_is_treated_as_abort() {
        let (mut handler, rx) = decision_channel();
        let responder = std::thread::spawn(move || {
            let request = rx.recv().unwrap();
            drop(request);
        });
        let decision = handler.decide(&problem(ProblemType::Other), &BTreeMap::new());
        assert!(decision.is_none());
        responder.join().unwrap();
    }
}
