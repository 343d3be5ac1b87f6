/*!
 * Editing core: immutable snapshots plus an atomic-op transform engine.
 *
 * All edits are represented as **ops** (`Op` enum) applied through a pure
 * function from snapshot to snapshot; a [`Transform`] batches several ops
 * and [`Editor::apply`] commits the batch as a single undo step. Snapshots
 * are plain values: the history stacks retain prior snapshots directly, so
 * undo is a swap, never a replay.
 *
 * Failure semantics follow the structural-error policy: ops given
 * coordinates that do not exist in the current snapshot fail fast without
 * mutating anything, because callers only ever derive coordinates from the
 * live snapshot.
 */

pub mod editor;
pub mod history;
pub mod ops;
pub mod snapshot;
pub mod transform;

pub use editor::{Change, Editor};
pub use history::History;
pub use ops::{apply_op, selection_marks, Op, StructuralError};
pub use snapshot::{Point, Selection, Snapshot};
pub use transform::Transform;
