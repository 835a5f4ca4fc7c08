//! Parallel sub-behaviors: several child machines active at once.

use crate::core::{NoopBehavior, StateBehavior, StateContext, StateMachine, StateResult};
use crate::events::{Event, EventOutcome};
use std::time::Duration;

struct Region {
    name: String,
    machine: StateMachine,
    initial: String,
}

/// A [`StateBehavior`] driving several simultaneously-active child machines.
///
/// Where [`HierarchicalState`](crate::hierarchy::HierarchicalState) tracks a
/// single child pointer, a composite tracks a set of named regions, each with
/// its own machine. Entering the composite starts every region; updating
/// drives all of them; events broadcast across regions until one reports
/// `Handled`; exiting stops them all.
pub struct CompositeState {
    inner: Box<dyn StateBehavior>,
    regions: Vec<Region>,
    propagate_events: bool,
}

impl CompositeState {
    /// Create a composite with no inner behavior.
    pub fn new() -> Self {
        Self::wrapping(NoopBehavior)
    }

    /// Create a composite around an inner behavior.
    pub fn wrapping(inner: impl StateBehavior + 'static) -> Self {
        Self {
            inner: Box::new(inner),
            regions: Vec::new(),
            propagate_events: true,
        }
    }

    /// Add a named region started at `initial` whenever the composite enters.
    pub fn with_region(
        mut self,
        name: impl Into<String>,
        machine: StateMachine,
        initial: impl Into<String>,
    ) -> Self {
        self.regions.push(Region {
            name: name.into(),
            machine,
            initial: initial.into(),
        });
        self
    }

    /// Whether unconsumed events broadcast into the regions (default true).
    pub fn propagate_events(mut self, propagate: bool) -> Self {
        self.propagate_events = propagate;
        self
    }

    /// The set of currently active children as `(region, current state)`
    /// pairs. Regions that are not running are absent.
    pub fn active_children(&self) -> Vec<(&str, &str)> {
        self.regions
            .iter()
            .filter_map(|r| {
                r.machine
                    .current_state_id()
                    .map(|cur| (r.name.as_str(), cur))
            })
            .collect()
    }

    /// Look up a region's machine by name.
    pub fn region(&self, name: &str) -> Option<&StateMachine> {
        self.regions
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.machine)
    }
}

impl Default for CompositeState {
    fn default() -> Self {
        Self::new()
    }
}

impl StateBehavior for CompositeState {
    /// Inner enter, then start every region. Any region failing to start
    /// stops the ones already started and fails the whole enter.
    fn on_enter(&mut self, ctx: &mut StateContext) -> StateResult {
        let result = self.inner.on_enter(ctx);
        if result == StateResult::Error {
            return StateResult::Error;
        }

        for index in 0..self.regions.len() {
            let region = &mut self.regions[index];
            let initial = region.initial.clone();
            if let Err(err) = region.machine.start(&initial) {
                log::error!("region '{}' failed to start: {}", region.name, err);
                for started in self.regions[..index].iter_mut() {
                    started.machine.stop();
                }
                return StateResult::Error;
            }
        }
        result
    }

    fn on_update(&mut self, ctx: &mut StateContext, dt: Duration) -> StateResult {
        let result = self.inner.on_update(ctx, dt);
        if result == StateResult::Error {
            return StateResult::Error;
        }
        for region in &mut self.regions {
            if region.machine.is_running() {
                region.machine.update(dt);
            }
        }
        result
    }

    /// Stop the regions in reverse start order, then run the inner exit.
    fn on_exit(&mut self, ctx: &mut StateContext) -> StateResult {
        for region in self.regions.iter_mut().rev() {
            region.machine.stop();
        }
        self.inner.on_exit(ctx)
    }

    /// Broadcast to regions until one consumes the event.
    fn on_event(&mut self, event: &Event, ctx: &mut StateContext) -> StateResult {
        let result = self.inner.on_event(event, ctx);
        if result == StateResult::Continue && self.propagate_events {
            for region in &mut self.regions {
                if region.machine.handle_event(event) == EventOutcome::Handled {
                    break;
                }
            }
        }
        result
    }
}
