//! The three deferred action queues of a staged build.
//!
//! Work that cannot run while type shells are still being declared is queued as a boxed
//! closure into one of three queues and drained later in a fixed order: every resolve
//! action, then every metadata action, then every body action. An action may queue further
//! work into its own pass or a later one; queueing into a pass that has already been drained
//! is an error, which is what keeps the ordering enforceable rather than a convention.

use std::collections::VecDeque;

use log::debug;
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::Result;

/// The phases of a staged build, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumIter)]
pub enum Phase {
    /// Type shells are declared; nothing is drained yet
    Declare,
    /// Base types, generic parameters and members
    Resolve,
    /// Custom attributes, security, constants and overrides
    Metadata,
    /// Method bodies
    Body,
    /// Every queue drained
    Done,
}

/// A queued unit of work over build state `C`.
pub type Action<'a, C> = Box<dyn FnOnce(&mut C, &mut DeferredActions<'a, C>) -> Result<()> + 'a>;

/// Three ordered queues of deferred work.
pub struct DeferredActions<'a, C> {
    phase: Phase,
    resolve: VecDeque<Action<'a, C>>,
    metadata: VecDeque<Action<'a, C>>,
    body: VecDeque<Action<'a, C>>,
}

impl<C> Default for DeferredActions<'_, C> {
    fn default() -> Self {
        DeferredActions {
            phase: Phase::Declare,
            resolve: VecDeque::new(),
            metadata: VecDeque::new(),
            body: VecDeque::new(),
        }
    }
}

impl<'a, C> DeferredActions<'a, C> {
    /// Empty queues in the declare phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The phase currently running.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of actions waiting in `phase`.
    #[must_use]
    pub fn pending(&self, phase: Phase) -> usize {
        match phase {
            Phase::Resolve => self.resolve.len(),
            Phase::Metadata => self.metadata.len(),
            Phase::Body => self.body.len(),
            Phase::Declare | Phase::Done => 0,
        }
    }

    /// Queue `action` to run in `phase`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if `phase` is not a queue or has already
    /// been drained.
    pub fn defer(
        &mut self,
        phase: Phase,
        action: impl FnOnce(&mut C, &mut DeferredActions<'a, C>) -> Result<()> + 'a,
    ) -> Result<()> {
        if phase < self.phase {
            return Err(invalid_operation!(
                "Cannot queue {} work while the {} pass runs",
                phase,
                self.phase
            ));
        }
        let queue = match phase {
            Phase::Resolve => &mut self.resolve,
            Phase::Metadata => &mut self.metadata,
            Phase::Body => &mut self.body,
            Phase::Declare | Phase::Done => {
                return Err(invalid_operation!("{} is not a deferred pass", phase))
            }
        };
        queue.push_back(Box::new(action));
        Ok(())
    }

    fn pop(&mut self, phase: Phase) -> Option<Action<'a, C>> {
        match phase {
            Phase::Resolve => self.resolve.pop_front(),
            Phase::Metadata => self.metadata.pop_front(),
            Phase::Body => self.body.pop_front(),
            Phase::Declare | Phase::Done => None,
        }
    }

    /// Drain the three queues in order, each to completion before the next starts.
    ///
    /// The first failing action aborts the run; the remaining actions are dropped.
    ///
    /// # Errors
    /// Returns the error of the first failing action, or
    /// [`crate::Error::InvalidOperation`] if the queues were already drained.
    pub fn run(&mut self, context: &mut C) -> Result<()> {
        if self.phase != Phase::Declare {
            return Err(invalid_operation!("Deferred passes already ran"));
        }
        for phase in Phase::iter().filter(|phase| !matches!(phase, Phase::Declare | Phase::Done)) {
            self.phase = phase;
            debug!("{} pass: {} action(s) queued", phase, self.pending(phase));
            let mut count = 0usize;
            while let Some(action) = self.pop(phase) {
                if let Err(error) = action(context, self) {
                    self.resolve.clear();
                    self.metadata.clear();
                    self.body.clear();
                    self.phase = Phase::Done;
                    return Err(error);
                }
                count += 1;
            }
            debug!("{} pass: {} action(s) ran", phase, count);
        }
        self.phase = Phase::Done;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    type Log = Vec<(Phase, &'static str)>;

    #[test]
    fn passes_drain_in_order() {
        let mut queues: DeferredActions<Log> = DeferredActions::new();
        queues
            .defer(Phase::Body, |log: &mut Log, _| {
                log.push((Phase::Body, "body"));
                Ok(())
            })
            .unwrap();
        queues
            .defer(Phase::Metadata, |log: &mut Log, _| {
                log.push((Phase::Metadata, "metadata"));
                Ok(())
            })
            .unwrap();
        queues
            .defer(Phase::Resolve, |log: &mut Log, queues| {
                log.push((Phase::Resolve, "first"));
                queues.defer(Phase::Body, |log: &mut Log, _| {
                    log.push((Phase::Body, "late body"));
                    Ok(())
                })?;
                queues.defer(Phase::Resolve, |log: &mut Log, _| {
                    log.push((Phase::Resolve, "late resolve"));
                    Ok(())
                })
            })
            .unwrap();

        let mut log = Log::new();
        queues.run(&mut log).unwrap();
        assert_eq!(
            log,
            vec![
                (Phase::Resolve, "first"),
                (Phase::Resolve, "late resolve"),
                (Phase::Metadata, "metadata"),
                (Phase::Body, "body"),
                (Phase::Body, "late body"),
            ]
        );
        assert_eq!(queues.phase(), Phase::Done);
        assert!(queues.run(&mut log).is_err());
    }

    #[test]
    fn drained_passes_reject_new_work() {
        let mut queues: DeferredActions<Log> = DeferredActions::new();
        queues
            .defer(Phase::Metadata, |_: &mut Log, queues| {
                queues.defer(Phase::Resolve, |_: &mut Log, _| Ok(()))
            })
            .unwrap();
        assert!(matches!(
            queues.run(&mut Log::new()),
            Err(Error::InvalidOperation(_))
        ));
        assert!(queues.defer(Phase::Declare, |_: &mut Log, _| Ok(())).is_err());
    }

    #[test]
    fn failure_drops_remaining_work() {
        let mut queues: DeferredActions<Log> = DeferredActions::new();
        queues
            .defer(Phase::Resolve, |_: &mut Log, _| Err(unresolved!("missing")))
            .unwrap();
        queues
            .defer(Phase::Body, |log: &mut Log, _| {
                log.push((Phase::Body, "never"));
                Ok(())
            })
            .unwrap();
        let mut log = Log::new();
        assert!(matches!(queues.run(&mut log), Err(Error::UnresolvedSymbol(_))));
        assert!(log.is_empty());
        assert_eq!(queues.pending(Phase::Body), 0);
    }
}
