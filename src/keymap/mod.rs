/*!
 * Keymap dispatcher: a fixed-priority list of predicate+handler rules over
 * (key event, snapshot).
 *
 * Rules are evaluated in order per keystroke; the first rule whose
 * predicate matches gets to handle the event, though a rule may decline
 * (the list/table delegation does when its collaborator reports a no-op)
 * and let scanning continue. When nothing matches, the dispatcher performs
 * the platform-default single-character insert/delete itself and reports
 * anything else back to the host as unhandled.
 */

pub mod rules;

use log::trace;

use crate::editing::{Change, Editor, Snapshot, StructuralError, Transform};
use crate::models::BlockType;
use crate::keymap::rules::{
    EmptyBlockBackspace, HistoryShortcut, KeyRule, MarkShortcut, SoftBreak,
    StructuralDelegation, VoidBlockEnter,
};

/// A normalized key press. `modifier` is the platform command key
/// (ctrl/cmd); the dispatcher never distinguishes the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: KeyPress,
    pub shift: bool,
    pub modifier: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPress {
    Enter,
    Backspace,
    Delete,
    Tab,
    Char(char),
}

impl KeyEvent {
    pub fn new(key: KeyPress) -> Self {
        KeyEvent {
            key,
            shift: false,
            modifier: false,
        }
    }

    pub fn ch(c: char) -> Self {
        KeyEvent::new(KeyPress::Char(c))
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn with_modifier(mut self) -> Self {
        self.modifier = true;
        self
    }
}

/// Outcome of dispatching one key event.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// A rule handled the event and committed a change.
    Handled(Change),
    /// The event was consumed without changing anything (exhausted undo).
    Noop,
    /// No rule claimed the event; the host keeps its default behavior.
    Unhandled,
}

/// The pluggable list/table editing collaborator. Given the event and the
/// live snapshot it returns the edited snapshot, or `None` for a no-op
/// (which falls through to the remaining rules).
pub trait StructuralEditor {
    fn handle(&self, event: &KeyEvent, snapshot: &Snapshot) -> Option<Snapshot>;
}

/// Soft-break behavior (rule 6).
#[derive(Debug, Clone)]
pub struct SoftBreakConfig {
    /// Require Shift+Enter instead of bare Enter.
    pub require_shift: bool,
    /// Block types the rule never fires in.
    pub ignore_in: Vec<BlockType>,
    /// Consecutive trailing newlines that close the block.
    pub close_after: usize,
    /// Container types unwrapped when the block closes.
    pub unwrap: Vec<BlockType>,
}

impl Default for SoftBreakConfig {
    fn default() -> Self {
        SoftBreakConfig {
            require_shift: false,
            ignore_in: structural_ignore_set(),
            close_after: 1,
            unwrap: vec![BlockType::Quote, BlockType::Code],
        }
    }
}

/// Empty-block backspace behavior (rule 7).
#[derive(Debug, Clone)]
pub struct BackspaceConfig {
    pub ignore_in: Vec<BlockType>,
}

impl Default for BackspaceConfig {
    fn default() -> Self {
        BackspaceConfig {
            ignore_in: structural_ignore_set(),
        }
    }
}

fn structural_ignore_set() -> Vec<BlockType> {
    vec![
        BlockType::Paragraph,
        BlockType::ListItem,
        BlockType::BulletedList,
        BlockType::NumberedList,
        BlockType::Table,
        BlockType::TableRow,
        BlockType::TableCell,
    ]
}

#[derive(Debug, Clone, Default)]
pub struct KeymapConfig {
    pub soft_break: SoftBreakConfig,
    pub backspace: BackspaceConfig,
}

/// The dispatcher itself: an ordered rule list built from a config.
pub struct Keymap {
    rules: Vec<Box<dyn KeyRule>>,
}

impl Keymap {
    pub fn new(config: KeymapConfig) -> Self {
        Self::build(config, None)
    }

    /// A keymap that defers list/table editing to an external collaborator
    /// before the soft-break and backspace rules run.
    pub fn with_structural_editor(
        config: KeymapConfig,
        structural: Box<dyn StructuralEditor>,
    ) -> Self {
        Self::build(config, Some(structural))
    }

    fn build(config: KeymapConfig, structural: Option<Box<dyn StructuralEditor>>) -> Self {
        let mut rules: Vec<Box<dyn KeyRule>> = vec![
            Box::new(VoidBlockEnter),
            Box::new(HistoryShortcut),
            Box::new(MarkShortcut),
        ];
        if let Some(structural) = structural {
            rules.push(Box::new(StructuralDelegation::new(structural)));
        }
        rules.push(Box::new(SoftBreak::new(config.soft_break)));
        rules.push(Box::new(EmptyBlockBackspace::new(config.backspace)));
        Keymap { rules }
    }

    /// Route one key event: first matching rule wins, a declined match
    /// falls through, and the platform default covers the rest.
    pub fn dispatch(
        &self,
        editor: &mut Editor,
        event: &KeyEvent,
    ) -> Result<Dispatch, StructuralError> {
        for rule in &self.rules {
            if rule.matches(event, editor.snapshot()) {
                trace!("keymap: rule {} matched {event:?}", rule.name());
                match rule.apply(event, editor)? {
                    Dispatch::Unhandled => continue,
                    handled => return Ok(handled),
                }
            }
        }
        self.default_behavior(editor, event)
    }

    fn default_behavior(
        &self,
        editor: &mut Editor,
        event: &KeyEvent,
    ) -> Result<Dispatch, StructuralError> {
        match event.key {
            KeyPress::Char(c) if !event.modifier => {
                let focus = editor.snapshot().selection.focus;
                let change = editor.apply(Transform::new().insert_text(focus, c.to_string()))?;
                Ok(Dispatch::Handled(change))
            }
            KeyPress::Backspace if !event.modifier => {
                let change = editor.apply(Transform::new().delete_backward(1))?;
                Ok(Dispatch::Handled(change))
            }
            KeyPress::Delete if !event.modifier => {
                let change = editor.apply(Transform::new().delete_forward(1))?;
                Ok(Dispatch::Handled(change))
            }
            _ => Ok(Dispatch::Unhandled),
        }
    }
}
