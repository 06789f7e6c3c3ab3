//! Task graph: CRUD over tasks, parent/child and dependency references,
//! single-active-phase enforcement, and field-weighted search.

mod graph;
mod model;
mod repo;
mod search;

pub use graph::{AssignMode, BulkOp, BulkOpResult, CreateSelfTaskInput, TaskGraph, ViewTasksFilter};
pub use model::{Task, TaskNote, TaskPriority, TaskStatus};
pub use repo::{active_phase_roots, find_active_phase, phase_active};
pub use search::{ScoredTask, SearchOptions, TaskSearch};
