//! Two-branch join used by the manager.
//!
//! Completion is tracked with explicit flags rather than inferred from which result fields
//! happen to be filled in, so a branch that legitimately yields empty text still counts.

/// The two parallel branches of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// Problem statement / requirements / expectations extraction.
    Extraction,
    /// Section outline generation.
    Generation,
}

/// Observable state of the join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    /// Neither branch has reported.
    AwaitingBoth,
    /// Exactly one branch has reported.
    OneDone(Branch),
    /// Both branches reported and the merged result was released.
    BothDone,
}

/// What the caller should do after recording a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinDecision {
    /// The other branch is still running.
    Wait,
    /// Both branches are in; publish the merged result now.
    Publish,
    /// The merged result was already released for this run.
    AlreadyPublished,
}

/// Per-run completion flags with an at-most-once publish latch.
#[derive(Debug, Default, Clone)]
pub struct JoinCoordinator {
    extraction_done: bool,
    generation_done: bool,
    published: bool,
}

impl JoinCoordinator {
    /// Fresh coordinator in [`JoinState::AwaitingBoth`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `branch` finished and decide whether to publish.
    ///
    /// Returns [`JoinDecision::Publish`] exactly once per coordinator.
    pub fn complete(&mut self, branch: Branch) -> JoinDecision {
        if self.published {
            return JoinDecision::AlreadyPublished;
        }
        match branch {
            Branch::Extraction => self.extraction_done = true,
            Branch::Generation => self.generation_done = true,
        }
        if self.extraction_done && self.generation_done {
            self.published = true;
            JoinDecision::Publish
        } else {
            JoinDecision::Wait
        }
    }

    /// Current state of the join.
    pub fn state(&self) -> JoinState {
        match (self.extraction_done, self.generation_done) {
            (true, true) => JoinState::BothDone,
            (true, false) => JoinState::OneDone(Branch::Extraction),
            (false, true) => JoinState::OneDone(Branch::Generation),
            (false, false) => JoinState::AwaitingBoth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_first_publishes_on_generation() {
        let mut join = JoinCoordinator::new();
        assert_eq!(join.state(), JoinState::AwaitingBoth);
        assert_eq!(join.complete(Branch::Extraction), JoinDecision::Wait);
        assert_eq!(join.state(), JoinState::OneDone(Branch::Extraction));
        assert_eq!(join.complete(Branch::Generation), JoinDecision::Publish);
        assert_eq!(join.state(), JoinState::BothDone);
    }

    #[test]
    fn generation_first_publishes_on_extraction() {
        let mut join = JoinCoordinator::new();
        assert_eq!(join.complete(Branch::Generation), JoinDecision::Wait);
        assert_eq!(join.state(), JoinState::OneDone(Branch::Generation));
        assert_eq!(join.complete(Branch::Extraction), JoinDecision::Publish);
    }

    #[test]
    fn repeated_branch_does_not_trigger_publish() {
        let mut join = JoinCoordinator::new();
        assert_eq!(join.complete(Branch::Extraction), JoinDecision::Wait);
        assert_eq!(join.complete(Branch::Extraction), JoinDecision::Wait);
        assert_eq!(join.state(), JoinState::OneDone(Branch::Extraction));
    }

    #[test]
    fn publish_happens_at_most_once() {
        let mut join = JoinCoordinator::new();
        join.complete(Branch::Extraction);
        assert_eq!(join.complete(Branch::Generation), JoinDecision::Publish);
        assert_eq!(
            join.complete(Branch::Generation),
            JoinDecision::AlreadyPublished
        );
        assert_eq!(
            join.complete(Branch::Extraction),
            JoinDecision::AlreadyPublished
        );
    }
}
