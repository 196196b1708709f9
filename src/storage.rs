// src/storage.rs
// SQLite persistence for the three tracked collections plus a small
// key/value settings table. The manager loads everything once at startup,
// owns the state in memory from then on, and flushes the full snapshot back
// on exit.

use crate::types::{Import, Project, ProjectConfig, Snapshot, SourceFile};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::collections::HashSet;
use std::path::Path;

pub struct Storage {
    conn: Connection,
}

fn map_row_to_file(row: &rusqlite::Row<'_>) -> SqlResult<SourceFile> {
    Ok(SourceFile {
        id: row.get(0)?,
        pid: row.get(1)?,
        input: row.get(2)?,
        output: row.get(3)?,
        file_type: row.get(4)?,
        name: row.get(5)?,
    })
}

impl Storage {
    pub fn open(db_path: &Path) -> Result<Storage, String> {
        let conn = Connection::open(db_path)
            .map_err(|e| format!("Failed to open database at '{}': {}", db_path.display(), e))?;
        let storage = Storage { conn };
        storage.init_tables()?;
        Ok(storage)
    }

    pub fn open_in_memory() -> Result<Storage, String> {
        let conn = Connection::open_in_memory()
            .map_err(|e| format!("Failed to open in-memory database: {}", e))?;
        let storage = Storage { conn };
        storage.init_tables()?;
        Ok(storage)
    }

    fn init_tables(&self) -> Result<(), String> {
        self.conn
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS projects (
                    id TEXT PRIMARY KEY NOT NULL,
                    name TEXT NOT NULL,
                    path TEXT NOT NULL UNIQUE,
                    config TEXT NOT NULL DEFAULT '{}',
                    updated_at TEXT
                );
                CREATE TABLE IF NOT EXISTS files (
                    id TEXT PRIMARY KEY NOT NULL,
                    pid TEXT NOT NULL,
                    input TEXT NOT NULL UNIQUE,
                    output TEXT NOT NULL,
                    file_type TEXT NOT NULL,
                    name TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS imports (
                    id TEXT PRIMARY KEY NOT NULL,
                    pid TEXT NOT NULL,
                    path TEXT NOT NULL UNIQUE,
                    parents TEXT NOT NULL DEFAULT '[]'
                );
                CREATE TABLE IF NOT EXISTS app_settings (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL
                );
                "#,
            )
            .map_err(|e| format!("Failed to initialize database tables: {}", e))
    }

    pub fn load_projects(&self) -> Result<Vec<Project>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, path, config, updated_at FROM projects")
            .map_err(|e| format!("Prepare projects query failed: {}", e))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })
            .map_err(|e| format!("Query projects failed: {}", e))?;

        let mut projects = Vec::new();
        for row in rows {
            let (id, name, path, config_json, updated_at) =
                row.map_err(|e| format!("Failed to map project row: {}", e))?;
            let config: ProjectConfig = serde_json::from_str(&config_json)
                .map_err(|e| format!("Failed to parse config of project {}: {}", id, e))?;
            projects.push(Project {
                id,
                name,
                path,
                config,
                updated_at,
            });
        }
        Ok(projects)
    }

    pub fn load_files(&self) -> Result<Vec<SourceFile>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, pid, input, output, file_type, name FROM files")
            .map_err(|e| format!("Prepare files query failed: {}", e))?;

        let rows = stmt
            .query_map([], map_row_to_file)
            .map_err(|e| format!("Query files failed: {}", e))?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row.map_err(|e| format!("Failed to map file row: {}", e))?);
        }
        Ok(files)
    }

    pub fn load_imports(&self) -> Result<Vec<Import>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, pid, path, parents FROM imports")
            .map_err(|e| format!("Prepare imports query failed: {}", e))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(|e| format!("Query imports failed: {}", e))?;

        let mut imports = Vec::new();
        for row in rows {
            let (id, pid, path, parents_json) =
                row.map_err(|e| format!("Failed to map import row: {}", e))?;
            let parents: HashSet<String> = serde_json::from_str(&parents_json)
                .map_err(|e| format!("Failed to parse parents of import {}: {}", id, e))?;
            imports.push(Import {
                id,
                pid,
                path,
                parents,
            });
        }
        Ok(imports)
    }

    /// Replaces the persisted state with the given snapshot in one
    /// transaction.
    pub fn save_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), String> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| format!("Begin save transaction failed: {}", e))?;

        tx.execute_batch("DELETE FROM projects; DELETE FROM files; DELETE FROM imports;")
            .map_err(|e| format!("Failed to clear persisted state: {}", e))?;

        for project in &snapshot.projects {
            let config_json = serde_json::to_string(&project.config)
                .map_err(|e| format!("Failed to serialize config of {}: {}", project.id, e))?;
            tx.execute(
                "INSERT INTO projects (id, name, path, config, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![project.id, project.name, project.path, config_json, project.updated_at],
            )
            .map_err(|e| format!("Failed to insert project {}: {}", project.id, e))?;
        }

        for file in &snapshot.files {
            tx.execute(
                "INSERT INTO files (id, pid, input, output, file_type, name) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![file.id, file.pid, file.input, file.output, file.file_type, file.name],
            )
            .map_err(|e| format!("Failed to insert file {}: {}", file.id, e))?;
        }

        for import in &snapshot.imports {
            let parents_json = serde_json::to_string(&import.parents)
                .map_err(|e| format!("Failed to serialize parents of {}: {}", import.id, e))?;
            tx.execute(
                "INSERT INTO imports (id, pid, path, parents) VALUES (?1, ?2, ?3, ?4)",
                params![import.id, import.pid, import.path, parents_json],
            )
            .map_err(|e| format!("Failed to insert import {}: {}", import.id, e))?;
        }

        tx.commit()
            .map_err(|e| format!("Commit save transaction failed: {}", e))
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>, String> {
        self.conn
            .query_row(
                "SELECT value FROM app_settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| format!("Failed to query app_settings for key '{}': {}", key, e))
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), String> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO app_settings (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(|e| format!("Failed to set app_setting for key '{}': {}", key, e))?;
        Ok(())
    }
}
