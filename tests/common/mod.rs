//! Common test utilities

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use taskrun::config::load_task_file;
use taskrun::Context;
use tempfile::TempDir;

/// Create a temporary directory with a TaskFile.yml file
pub fn create_task_file(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("TaskFile.yml");
    fs::write(&path, content).unwrap();
    (temp_dir, path)
}

/// Create a task file with an empty subdirectory next to it
pub fn create_task_file_in_subdir(content: &str) -> (TempDir, PathBuf, PathBuf) {
    let (temp_dir, path) = create_task_file(content);
    let sub_dir = temp_dir.path().join("subdir");
    fs::create_dir(&sub_dir).unwrap();
    (temp_dir, path, sub_dir)
}

/// Load a task file into a context whose commands run in the temp directory
pub fn load(content: &str) -> (TempDir, Context) {
    let (temp_dir, path) = create_task_file(content);
    let mut ctx = Context::new().with_working_dir(temp_dir.path().to_path_buf());
    ctx.env.set("_QUIET_", true).unwrap();
    load_task_file(&mut ctx, &path).unwrap();
    (temp_dir, ctx)
}

/// Lines written to a file in the temp directory
pub fn read_lines(dir: &Path, name: &str) -> Vec<String> {
    fs::read_to_string(dir.join(name))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
