use std::fmt;

/// Severity-ordered resource state. `Ord` follows severity, so escalation is
/// `max`.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ResourceState {
    #[default]
    Clean,
    /// Contents change; objects are reused.
    NeedsUpdate,
    /// Objects must be destroyed and recreated.
    NeedsRebuild,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Clean => "CLEAN",
            Self::NeedsUpdate => "NEEDS_UPDATE",
            Self::NeedsRebuild => "NEEDS_REBUILD",
        })
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceCategory {
    VertexBuffers,
    Uniforms,
    DescriptorSets,
    CommandBuffers,
    Pipelines,
}

impl ResourceCategory {
    pub const ALL: [ResourceCategory; 5] = [
        Self::VertexBuffers,
        Self::Uniforms,
        Self::DescriptorSets,
        Self::CommandBuffers,
        Self::Pipelines,
    ];

    #[inline]
    const fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::VertexBuffers => "vertex buffers",
            Self::Uniforms => "uniforms",
            Self::DescriptorSets => "descriptor sets",
            Self::CommandBuffers => "command buffers",
            Self::Pipelines => "pipelines",
        }
    }
}

/// Dirty flags for one renderable.
///
/// Render-thread owned. [`request`](Self::request) never lowers a state;
/// only the orchestrator returns a category to `Clean`, and only after the
/// matching create/update succeeded.
#[derive(Debug, Clone)]
pub struct StateTracker {
    label: &'static str,
    states: [ResourceState; 5],
    frame: u64,
    log_changes: bool,
}

impl StateTracker {
    pub fn new(label: &'static str, log_changes: bool) -> Self {
        Self {
            label,
            states: [ResourceState::Clean; 5],
            frame: 0,
            log_changes,
        }
    }

    /// Frame number stamped on subsequent transition logs.
    pub fn set_frame(&mut self, frame: u64) {
        self.frame = frame;
    }

    #[inline]
    pub fn get(&self, category: ResourceCategory) -> ResourceState {
        self.states[category.index()]
    }

    /// Raises `category` to at least `state` and returns the resulting state.
    /// A request for a lower severity than the current one is ignored.
    pub fn request(&mut self, category: ResourceCategory, state: ResourceState) -> ResourceState {
        let current = self.get(category);
        if state > current {
            self.transition(category, current, state);
        }
        self.get(category)
    }

    pub(crate) fn mark_clean(&mut self, category: ResourceCategory) {
        let current = self.get(category);
        if current != ResourceState::Clean {
            self.transition(category, current, ResourceState::Clean);
        }
    }

    pub fn is_clean(&self) -> bool {
        self.states.iter().all(|s| *s == ResourceState::Clean)
    }

    pub fn dirty(&self) -> impl Iterator<Item = (ResourceCategory, ResourceState)> + '_ {
        ResourceCategory::ALL
            .into_iter()
            .map(|c| (c, self.get(c)))
            .filter(|(_, s)| *s != ResourceState::Clean)
    }

    /// True when some category is dirty and there is something to build or
    /// tear down.
    pub fn needs_display_update(&self, has_content: bool) -> bool {
        has_content && !self.is_clean()
    }

    fn transition(&mut self, category: ResourceCategory, from: ResourceState, to: ResourceState) {
        self.states[category.index()] = to;
        if self.log_changes {
            log::trace!(
                target: "orrery::state",
                "frame {}: {} {}: {from} -> {to}",
                self.frame,
                self.label,
                category.name()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ResourceCategory::*;
    use ResourceState::*;

    // ── escalation ────────────────────────────────────────────────────────

    #[test]
    fn update_then_rebuild_escalates() {
        let mut t = StateTracker::new("t", false);
        t.request(VertexBuffers, NeedsUpdate);
        assert_eq!(t.request(VertexBuffers, NeedsRebuild), NeedsRebuild);
    }

    #[test]
    fn rebuild_is_not_downgraded() {
        let mut t = StateTracker::new("t", false);
        t.request(VertexBuffers, NeedsRebuild);
        assert_eq!(t.request(VertexBuffers, NeedsUpdate), NeedsRebuild);
        assert_eq!(t.request(VertexBuffers, Clean), NeedsRebuild);
    }

    #[test]
    fn categories_are_independent() {
        let mut t = StateTracker::new("t", false);
        t.request(Uniforms, NeedsUpdate);
        assert_eq!(t.get(Uniforms), NeedsUpdate);
        assert_eq!(t.get(VertexBuffers), Clean);
        assert_eq!(t.dirty().count(), 1);
    }

    // ── clean ─────────────────────────────────────────────────────────────

    #[test]
    fn mark_clean_resets() {
        let mut t = StateTracker::new("t", true);
        t.request(Pipelines, NeedsRebuild);
        t.mark_clean(Pipelines);
        assert!(t.is_clean());
    }

    #[test]
    fn display_update_needs_content() {
        let mut t = StateTracker::new("t", false);
        t.request(VertexBuffers, NeedsRebuild);
        assert!(!t.needs_display_update(false));
        assert!(t.needs_display_update(true));
    }
}
