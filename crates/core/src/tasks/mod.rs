//! Task execution through the installed task-runner tool.

pub mod executor;

pub use executor::{
    BIN_DIR_ENV, ExecutorConfig, TASK_FAILURE_SNIPPET_LINES, TaskInvoker, TaskOutput,
    split_task_args, summarize_task_failure,
};
