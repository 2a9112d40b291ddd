use crate::diff::{ChangeKind, DiffResult};
use crate::source_map::RenderedBlock;

/// Visual tag applied to one rendered block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Indicator {
    Added,
    Modified,
}

/// One node of the indicator view: a rendered block (possibly tagged)
/// or a marker inserted where baseline lines were deleted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Block {
        block: RenderedBlock,
        indicator: Option<Indicator>,
    },
    DeletionMarker,
}

type ResetFn = Box<dyn FnMut()>;

/// Overlays diff results as change indicators on an annotated block
/// tree, and exposes a manual "accept as new baseline" affordance.
///
/// The view holds no diff state of its own: indicators are fully
/// derived from the most recent [`apply_changes`](Self::apply_changes)
/// call. The reset affordance only invokes the host-supplied callback;
/// the host is expected to re-baseline its diff engine from the
/// rendered content and then call
/// [`clear_indicators`](Self::clear_indicators).
pub struct ChangeIndicators {
    nodes: Vec<Node>,
    reset_visible: bool,
    on_reset: ResetFn,
}

impl ChangeIndicators {
    pub fn new(blocks: Vec<RenderedBlock>, on_reset: ResetFn) -> Self {
        Self {
            nodes: wrap(blocks),
            reset_visible: false,
            on_reset,
        }
    }

    /// Replace the rendered content, dropping any applied indicators.
    pub fn set_content(&mut self, blocks: Vec<RenderedBlock>) {
        self.nodes = wrap(blocks);
        self.reset_visible = false;
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[must_use]
    pub fn reset_visible(&self) -> bool {
        self.reset_visible
    }

    /// Invoke the reset affordance.
    pub fn reset(&mut self) {
        (self.on_reset)();
    }

    /// Paint indicators for `diff` over the current content.
    ///
    /// Existing indicators are cleared first, so repeated calls with
    /// the same diff produce the same view. An empty diff leaves the
    /// content unmarked and the reset affordance hidden.
    pub fn apply_changes(&mut self, diff: &DiffResult) {
        self.clear_indicators();
        if !diff.has_changes {
            return;
        }

        let mut applied = false;

        for node in &mut self.nodes {
            let Node::Block { block, indicator } = node else {
                continue;
            };
            let Some(source) = block.source else {
                continue;
            };
            for change in &diff.changes {
                let tag = match change.kind {
                    ChangeKind::Added => Indicator::Added,
                    ChangeKind::Modified => Indicator::Modified,
                    ChangeKind::Deleted => continue,
                };
                if source.start_line < change.end_line && change.start_line < source.end_line {
                    *indicator = Some(tag);
                    applied = true;
                    break;
                }
            }
        }

        for change in &diff.changes {
            if change.kind != ChangeKind::Deleted {
                continue;
            }
            let at = self.nodes.iter().position(|node| {
                matches!(
                    node,
                    Node::Block {
                        block: RenderedBlock {
                            source: Some(source),
                            ..
                        },
                        ..
                    } if source.start_line >= change.start_line
                )
            });
            match at {
                Some(at) => self.nodes.insert(at, Node::DeletionMarker),
                None => self.nodes.push(Node::DeletionMarker),
            }
            applied = true;
        }

        self.reset_visible = applied;
    }

    /// Remove all tags and deletion markers and hide the reset
    /// affordance. Safe to call when nothing was applied.
    pub fn clear_indicators(&mut self) {
        self.nodes.retain(|node| matches!(node, Node::Block { .. }));
        for node in &mut self.nodes {
            if let Node::Block { indicator, .. } = node {
                *indicator = None;
            }
        }
        self.reset_visible = false;
    }
}

fn wrap(blocks: Vec<RenderedBlock>) -> Vec<Node> {
    blocks
        .into_iter()
        .map(|block| Node::Block {
            block,
            indicator: None,
        })
        .collect()
}
