// src/manager.rs
// The reconciliation core. ProjectsManager owns the three collections
// (projects, standalone files, imports), mutates them only through the
// operations below, and keeps them consistent with the filesystem via
// refresh_project_files. Every mutating operation leaves all invariants
// holding before it returns: one project per path, a path is never both a
// file input and an import path, and no import survives with an empty
// parent set.

use crate::config::UserOptions;
use crate::events::{ChangeListener, ConsoleNotifier, Notifier};
use crate::file_types::FileTypes;
use crate::filters::matches_filters;
use crate::scanner::scan_supported_files;
use crate::storage::Storage;
use crate::types::{Import, Project, ProjectConfig, Snapshot, SourceFile};
use crate::utils::{identity, sanitize_server_url};
use chrono::Utc;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::Path;

pub struct ProjectsManager {
    projects: Vec<Project>,
    files: Vec<SourceFile>,
    imports: Vec<Import>,
    options: UserOptions,
    file_types: Box<dyn FileTypes>,
    notifier: Box<dyn Notifier>,
    listeners: Vec<Box<dyn ChangeListener>>,
    // Ids of projects with a refresh in flight. A second refresh request for
    // the same project is rejected instead of interleaving with the running
    // one.
    refreshing: HashSet<String>,
}

impl ProjectsManager {
    pub fn new(options: UserOptions, file_types: Box<dyn FileTypes>) -> Self {
        ProjectsManager {
            projects: Vec::new(),
            files: Vec::new(),
            imports: Vec::new(),
            options,
            file_types,
            notifier: Box::new(ConsoleNotifier),
            listeners: Vec::new(),
            refreshing: HashSet::new(),
        }
    }

    /// Loads the persisted collections and drops every entry whose path no
    /// longer exists on disk, cascading as usual.
    pub fn from_storage(storage: &Storage, file_types: Box<dyn FileTypes>) -> Result<Self, String> {
        let options = UserOptions::load(storage)?;
        let mut manager = ProjectsManager::new(options, file_types);
        manager.projects = storage.load_projects()?;
        manager.files = storage.load_files()?;
        manager.imports = storage.load_imports()?;
        println!(
            "[MANAGER] Loaded {} projects, {} files, {} imports",
            manager.projects.len(),
            manager.files.len(),
            manager.imports.len()
        );

        let stale_projects: Vec<String> = manager
            .projects
            .iter()
            .filter(|p| !Path::new(&p.path).exists())
            .map(|p| p.id.clone())
            .collect();
        for pid in stale_projects {
            println!("[MANAGER] Project root vanished, removing project {}", pid);
            manager.remove_project(&pid);
        }

        let stale_files: Vec<String> = manager
            .files
            .iter()
            .filter(|f| !Path::new(&f.input).exists())
            .map(|f| f.id.clone())
            .collect();
        for fid in stale_files {
            manager.remove_file(&fid);
        }

        let stale_imports: Vec<String> = manager
            .imports
            .iter()
            .filter(|i| !Path::new(&i.path).exists())
            .map(|i| i.id.clone())
            .collect();
        for iid in stale_imports {
            manager.remove_import(&iid);
        }

        Ok(manager)
    }

    /// Writes the current state back to storage (called at application
    /// exit).
    pub fn flush(&self, storage: &mut Storage) -> Result<(), String> {
        storage.save_snapshot(&self.snapshot())
    }

    pub fn add_listener(&mut self, listener: Box<dyn ChangeListener>) {
        self.listeners.push(listener);
    }

    pub fn set_notifier(&mut self, notifier: Box<dyn Notifier>) {
        self.notifier = notifier;
    }

    pub fn options(&self) -> &UserOptions {
        &self.options
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            projects: self.projects.clone(),
            files: self.files.clone(),
            imports: self.imports.clone(),
        }
    }

    fn broadcast(&self) {
        let snapshot = self.snapshot();
        for listener in &self.listeners {
            listener.data_changed(&snapshot);
        }
    }

    // --- Project registry ---

    /// Adds a project for `folder` and runs its first refresh. A second call
    /// with the same folder is a no-op.
    pub fn add_project(&mut self, folder: &str) -> Result<(), String> {
        if self.projects.iter().any(|p| p.path == folder) {
            return Ok(());
        }

        let id = identity(folder);
        let name = Path::new(folder)
            .file_name()
            .map(|os| os.to_string_lossy().to_string())
            .unwrap_or_else(|| folder.to_string());

        let mut config = ProjectConfig {
            live_refresh: true,
            server_url: id.clone(),
            filter_patterns: String::new(),
            use_custom_server: false,
            custom_server_url: String::new(),
            css_path: self.options.css_path.clone(),
            js_path: self.options.js_path.clone(),
            html_path: self.options.html_path.clone(),
            js_min_path: self.options.js_min_path.clone(),
        };

        let slug = sanitize_server_url(&name);
        if !slug.is_empty() {
            config.server_url = self.resolve_server_url(slug);
        }

        println!("[MANAGER] Adding project {} at {}", name, folder);
        self.projects.push(Project {
            id: id.clone(),
            name,
            path: folder.to_string(),
            config,
            updated_at: Some(Utc::now().to_rfc3339()),
        });

        self.refresh_project_files(&id)?;

        for listener in &self.listeners {
            listener.focus_project(&id);
        }
        self.broadcast();
        Ok(())
    }

    // Collision handling tries `slug-1` through `slug-5`; when all five are
    // taken the colliding slug is kept as-is.
    fn resolve_server_url(&self, slug: String) -> String {
        let url_free =
            |url: &str| !self.projects.iter().any(|p| p.config.server_url == url);

        if url_free(&slug) {
            return slug;
        }
        for i in 1..6 {
            let candidate = format!("{}-{}", slug, i);
            if url_free(&candidate) {
                return candidate;
            }
        }
        slug
    }

    /// Removes a project and everything it owns. Unknown ids are a no-op.
    pub fn remove_project(&mut self, pid: &str) {
        if self.projects.iter().any(|p| p.id == pid) {
            self.projects.retain(|p| p.id != pid);
            self.remove_project_files(pid);
        }
        self.broadcast();
    }

    // Cascade: every file and import owned by the project goes with it.
    fn remove_project_files(&mut self, pid: &str) {
        if self.files.iter().any(|f| f.pid == pid) {
            self.files.retain(|f| f.pid != pid);
            self.imports.retain(|i| i.pid != pid);
        }
        self.broadcast();
    }

    pub fn get_project_by_id(&self, id: &str) -> Result<&Project, String> {
        self.projects
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| format!("Project {} not found", id))
    }

    pub fn get_project_config(&self, id: &str) -> Result<&ProjectConfig, String> {
        Ok(&self.get_project_by_id(id)?.config)
    }

    /// Replaces a project's filter pattern string. Takes effect on the next
    /// refresh; already tracked entries stay until then.
    pub fn set_project_filter_patterns(&mut self, pid: &str, patterns: &str) -> Result<(), String> {
        let project = self
            .projects
            .iter_mut()
            .find(|p| p.id == pid)
            .ok_or_else(|| format!("Project {} not found", pid))?;
        project.config.filter_patterns = patterns.to_string();
        self.broadcast();
        Ok(())
    }

    // --- File registry ---

    pub fn get_project_files(&self, pid: &str) -> Vec<&SourceFile> {
        self.files.iter().filter(|f| f.pid == pid).collect()
    }

    pub fn get_file_by_id(&self, id: &str) -> Result<&SourceFile, String> {
        self.files
            .iter()
            .find(|f| f.id == id)
            .ok_or_else(|| format!("File {} not found", id))
    }

    /// Tracks `file_path` as a standalone file. No-op when the path is
    /// already tracked (as a file or as an import) or its type is not
    /// supported. Batch callers pass `broadcast = false` and emit one
    /// broadcast themselves.
    pub fn add_file(
        &mut self,
        file_path: &str,
        project_path: &str,
        broadcast: bool,
    ) -> Result<(), String> {
        let already = self.files.iter().any(|f| f.input == file_path);
        let in_imports = self.imports.iter().any(|i| i.path == file_path);

        if self.file_types.is_supported(file_path) && !already && !in_imports {
            let record = self.file_types.format(file_path, project_path)?;
            self.files.push(record);
        }

        if broadcast {
            self.broadcast();
        }
        Ok(())
    }

    /// Untracks a file and detaches it from every import it parented,
    /// deleting imports whose parent set empties. Unknown ids are a no-op.
    pub fn remove_file(&mut self, id: &str) {
        if self.files.iter().any(|f| f.id == id) {
            self.files.retain(|f| f.id != id);
            self.remove_parent_from_all_imports(id);
            self.broadcast();
        }
    }

    /// Rewrites a file's output path, appending the type's compiled
    /// extension when `new_path` carries none.
    pub fn change_file_output(&mut self, id: &str, new_path: &str) -> Result<(), String> {
        let file_types = &self.file_types;
        let file = self
            .files
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| format!("File {} not found", id))?;

        let mut output = new_path.to_string();
        if Path::new(new_path).extension().is_none() {
            output.push_str(&file_types.compiled_extension(&file.input));
        }
        file.output = output;
        Ok(())
    }

    // --- Import graph ---

    pub fn get_import_by_id(&self, id: &str) -> Result<&Import, String> {
        self.imports
            .iter()
            .find(|i| i.id == id)
            .ok_or_else(|| format!("Import {} not found", id))
    }

    /// Imports that `fid` currently parents.
    pub fn get_file_imports(&self, fid: &str) -> Vec<Import> {
        self.imports
            .iter()
            .filter(|i| i.parents.contains(fid))
            .cloned()
            .collect()
    }

    /// Records `imported_path` as imported by `parent_path`: creates the
    /// import with a single parent or merges the parent into the existing
    /// record. The imported path is then demoted if it was tracked as a
    /// standalone file.
    pub fn add_file_import(&mut self, project_path: &str, parent_path: &str, imported_path: &str) {
        let parent_id = identity(parent_path);

        match self.imports.iter_mut().find(|i| i.path == imported_path) {
            Some(import) => {
                import.parents.insert(parent_id);
            }
            None => {
                self.imports.push(Import {
                    id: identity(imported_path),
                    pid: identity(project_path),
                    path: imported_path.to_string(),
                    parents: [parent_id].into_iter().collect(),
                });
            }
        }

        // An import target can never simultaneously be a standalone file.
        self.remove_file(&identity(imported_path));
        self.broadcast();
    }

    /// Detaches `fid` from one import, deleting the record when its parent
    /// set empties.
    pub fn remove_import_parent(&mut self, import_id: &str, fid: &str) {
        if let Some(pos) = self.imports.iter().position(|i| i.id == import_id) {
            let emptied = {
                let import = &mut self.imports[pos];
                import.parents.remove(fid);
                import.parents.is_empty()
            };
            if emptied {
                self.imports.remove(pos);
            }
            self.broadcast();
        }
    }

    /// Unconditional removal, used when the imported path itself vanished
    /// from disk.
    pub fn remove_import(&mut self, id: &str) {
        if self.imports.iter().any(|i| i.id == id) {
            self.imports.retain(|i| i.id != id);
        }
        self.broadcast();
    }

    fn remove_parent_from_all_imports(&mut self, fid: &str) {
        let import_ids: Vec<String> = self.imports.iter().map(|i| i.id.clone()).collect();
        for import_id in import_ids {
            self.remove_import_parent(&import_id, fid);
        }
    }

    // --- Reconciliation ---

    /// Resynchronizes one project against the filesystem and the filter
    /// patterns: prunes stale files, rescans the root, registers root files
    /// and their imports, and detaches imports no longer declared. A missing
    /// project root removes the whole project. Re-entrant calls for a
    /// project already refreshing are rejected as no-ops.
    pub fn refresh_project_files(&mut self, pid: &str) -> Result<(), String> {
        if !self.refreshing.insert(pid.to_string()) {
            println!("[MANAGER] Refresh already in flight for {}, skipping", pid);
            return Ok(());
        }
        let result = self.do_refresh(pid);
        self.refreshing.remove(pid);
        result
    }

    fn do_refresh(&mut self, pid: &str) -> Result<(), String> {
        let (folder, project_patterns) = {
            let project = self.get_project_by_id(pid)?;
            (project.path.clone(), project.config.filter_patterns.clone())
        };
        println!("[MANAGER] Refreshing project {} ({})", pid, folder);

        // 1. Prune tracked files that are now filtered out or gone from
        //    disk, so the diff below never sees stale entries.
        let stale: Vec<String> = self
            .files
            .iter()
            .filter(|f| f.pid == pid)
            .filter(|f| {
                matches_filters(&project_patterns, &self.options.filter_patterns, &f.input)
                    || !Path::new(&f.input).exists()
            })
            .map(|f| f.id.clone())
            .collect();
        for fid in stale {
            self.remove_file(&fid);
        }

        // 2. A vanished project root means the project is gone, not a
        //    transient error.
        if !Path::new(&folder).exists() {
            println!("[MANAGER] Project root {} no longer exists, removing", folder);
            self.remove_project(pid);
            return Ok(());
        }

        // 3. + 4. Scan and keep only unfiltered paths. Scan errors have
        //    already been reported and degrade to a partial listing.
        let scanned = scan_supported_files(
            Path::new(&folder),
            self.file_types.as_ref(),
            self.notifier.as_ref(),
        );
        let kept: Vec<String> = scanned
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .filter(|p| !matches_filters(&project_patterns, &self.options.filter_patterns, p))
            .collect();

        // 5. Extract declared imports per kept file. Pure reads, so the
        //    per-file work can fan out.
        let file_types = self.file_types.as_ref();
        let extracted: Vec<(String, Vec<String>)> = kept
            .par_iter()
            .map(|path| (path.clone(), file_types.get_imports(path)))
            .collect();

        // 6. Detach previously recorded imports a file no longer declares.
        //    This runs before registration so a path whose last parent just
        //    dropped it can be picked up as a standalone file in the same
        //    refresh.
        for (path, declared) in &extracted {
            let fid = identity(path);
            for old_import in self.get_file_imports(&fid) {
                if !declared.contains(&old_import.path) {
                    self.remove_import_parent(&old_import.id, &fid);
                }
            }
        }

        // 7. Register roots. A kept file is standalone only when no other
        //    kept file imports it; its declared imports are merged into the
        //    graph with this file as parent.
        let imports_of_all_files: HashSet<&String> = extracted
            .iter()
            .flat_map(|(_, declared)| declared.iter())
            .collect();
        for (path, declared) in &extracted {
            if !imports_of_all_files.contains(path) {
                self.add_file(path, &folder, false)?;
                for imported in declared {
                    self.add_file_import(&folder, path, imported);
                }
            }
        }

        if let Some(project) = self.projects.iter_mut().find(|p| p.id == pid) {
            project.updated_at = Some(Utc::now().to_rfc3339());
        }

        // 8. Final snapshot broadcast; intermediate ones already went out
        //    per mutation.
        self.broadcast();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_types::DefaultFileTypes;
    use crate::types::Snapshot;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn manager() -> ProjectsManager {
        ProjectsManager::new(UserOptions::default(), Box::new(DefaultFileTypes))
    }

    fn manager_with_project(path: &str) -> ProjectsManager {
        // The path does not exist, so the initial refresh removes the
        // project again; push directly to exercise registry operations
        // against a fixed project.
        let mut m = manager();
        m.projects.push(Project {
            id: identity(path),
            name: "test".to_string(),
            path: path.to_string(),
            config: ProjectConfig {
                live_refresh: true,
                server_url: identity(path),
                filter_patterns: String::new(),
                use_custom_server: false,
                custom_server_url: String::new(),
                css_path: "css".to_string(),
                js_path: "js".to_string(),
                html_path: "html".to_string(),
                js_min_path: "js/min".to_string(),
            },
            updated_at: None,
        });
        m
    }

    #[test]
    fn add_project_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().to_string_lossy().to_string();
        let mut m = manager();
        m.add_project(&folder).unwrap();
        m.add_project(&folder).unwrap();
        assert_eq!(m.snapshot().projects.len(), 1);
    }

    #[test]
    fn add_project_focuses_new_project() {
        struct FocusSpy(Rc<RefCell<Vec<String>>>);
        impl ChangeListener for FocusSpy {
            fn data_changed(&self, _snapshot: &Snapshot) {}
            fn focus_project(&self, project_id: &str) {
                self.0.borrow_mut().push(project_id.to_string());
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().to_string_lossy().to_string();
        let focused = Rc::new(RefCell::new(Vec::new()));
        let mut m = manager();
        m.add_listener(Box::new(FocusSpy(focused.clone())));

        m.add_project(&folder).unwrap();
        assert_eq!(*focused.borrow(), vec![identity(&folder)]);
    }

    #[test]
    fn server_url_slug_collision_appends_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let site_a = dir.path().join("one/My Site");
        let site_b = dir.path().join("two/My Site");
        std::fs::create_dir_all(&site_a).unwrap();
        std::fs::create_dir_all(&site_b).unwrap();

        let mut m = manager();
        m.add_project(&site_a.to_string_lossy()).unwrap();
        m.add_project(&site_b.to_string_lossy()).unwrap();

        let snapshot = m.snapshot();
        let urls: Vec<&str> = snapshot
            .projects
            .iter()
            .map(|p| p.config.server_url.as_str())
            .collect();
        assert!(urls.contains(&"My-Site"));
        assert!(urls.contains(&"My-Site-1"));
    }

    #[test]
    fn server_url_falls_back_to_colliding_slug_after_five_tries() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager();
        for i in 0..7 {
            let site = dir.path().join(format!("{}/My Site", i));
            std::fs::create_dir_all(&site).unwrap();
            m.add_project(&site.to_string_lossy()).unwrap();
        }

        let snapshot = m.snapshot();
        assert_eq!(snapshot.projects.len(), 7);
        let collisions = snapshot
            .projects
            .iter()
            .filter(|p| p.config.server_url == "My-Site")
            .count();
        // The seventh project exhausts My-Site-1..My-Site-5 and keeps the
        // colliding slug.
        assert_eq!(collisions, 2);
    }

    #[test]
    fn empty_slug_keeps_identity_url() {
        let dir = tempfile::tempdir().unwrap();
        let site = dir.path().join("日本語");
        std::fs::create_dir_all(&site).unwrap();
        let folder = site.to_string_lossy().to_string();

        let mut m = manager();
        m.add_project(&folder).unwrap();
        assert_eq!(
            m.snapshot().projects[0].config.server_url,
            identity(&folder)
        );
    }

    #[test]
    fn remove_project_cascades_to_files_and_imports() {
        let mut m = manager_with_project("/p");
        let pid = identity("/p");
        m.add_file("/p/a.css", "/p", false).unwrap();
        m.add_file_import("/p", "/p/a.css", "/p/b.css");

        m.remove_project(&pid);

        let snapshot = m.snapshot();
        assert!(snapshot.projects.is_empty());
        assert!(snapshot.files.iter().all(|f| f.pid != pid));
        assert!(snapshot.imports.iter().all(|i| i.pid != pid));
    }

    #[test]
    fn remove_unknown_entities_is_a_no_op() {
        let mut m = manager_with_project("/p");
        m.remove_project("nope");
        m.remove_file("nope");
        m.remove_import("nope");
        m.remove_import_parent("nope", "nope");
        assert_eq!(m.snapshot().projects.len(), 1);
    }

    #[test]
    fn lookups_fail_loudly_on_unknown_ids() {
        let m = manager();
        assert!(m.get_project_by_id("x").is_err());
        assert!(m.get_project_config("x").is_err());
        assert!(m.get_file_by_id("x").is_err());
        assert!(m.get_import_by_id("x").is_err());
    }

    #[test]
    fn add_file_skips_unsupported_and_duplicate_paths() {
        let mut m = manager_with_project("/p");
        m.add_file("/p/readme.txt", "/p", false).unwrap();
        m.add_file("/p/a.css", "/p", false).unwrap();
        m.add_file("/p/a.css", "/p", false).unwrap();
        assert_eq!(m.snapshot().files.len(), 1);
    }

    #[test]
    fn import_target_is_never_also_a_file() {
        let mut m = manager_with_project("/p");
        m.add_file("/p/a.css", "/p", false).unwrap();
        m.add_file("/p/b.css", "/p", false).unwrap();

        // b.css is discovered as an import of a.css: it must be demoted.
        m.add_file_import("/p", "/p/a.css", "/p/b.css");

        let snapshot = m.snapshot();
        assert!(snapshot.files.iter().all(|f| f.input != "/p/b.css"));
        assert_eq!(snapshot.imports.len(), 1);

        // And it cannot be re-added as a file while the import exists.
        m.add_file("/p/b.css", "/p", false).unwrap();
        assert!(m.snapshot().files.iter().all(|f| f.input != "/p/b.css"));
    }

    #[test]
    fn import_parents_merge_and_cascade() {
        let mut m = manager_with_project("/p");
        m.add_file("/p/a.css", "/p", false).unwrap();
        m.add_file("/p/c.css", "/p", false).unwrap();
        m.add_file_import("/p", "/p/a.css", "/p/b.css");
        m.add_file_import("/p", "/p/c.css", "/p/b.css");
        // Re-adding the same parent is an idempotent union.
        m.add_file_import("/p", "/p/a.css", "/p/b.css");

        let import_id = identity("/p/b.css");
        assert_eq!(m.get_import_by_id(&import_id).unwrap().parents.len(), 2);

        m.remove_import_parent(&import_id, &identity("/p/a.css"));
        assert_eq!(m.get_import_by_id(&import_id).unwrap().parents.len(), 1);

        // Dropping the last parent removes the record entirely.
        m.remove_import_parent(&import_id, &identity("/p/c.css"));
        assert!(m.get_import_by_id(&import_id).is_err());
    }

    #[test]
    fn removing_a_file_detaches_it_from_all_imports() {
        let mut m = manager_with_project("/p");
        m.add_file("/p/a.css", "/p", false).unwrap();
        m.add_file("/p/c.css", "/p", false).unwrap();
        m.add_file_import("/p", "/p/a.css", "/p/b.css");
        m.add_file_import("/p", "/p/c.css", "/p/b.css");
        m.add_file_import("/p", "/p/a.css", "/p/d.css");

        m.remove_file(&identity("/p/a.css"));

        let snapshot = m.snapshot();
        // d.css lost its only parent and is gone, b.css keeps c.css.
        assert_eq!(snapshot.imports.len(), 1);
        assert_eq!(snapshot.imports[0].path, "/p/b.css");
        assert!(snapshot
            .imports
            .iter()
            .all(|i| !i.parents.contains(&identity("/p/a.css"))));
        assert!(snapshot.imports.iter().all(|i| !i.parents.is_empty()));
    }

    #[test]
    fn change_file_output_appends_compiled_extension() {
        let mut m = manager_with_project("/p");
        m.add_file("/p/a.scss", "/p", false).unwrap();
        let fid = identity("/p/a.scss");

        m.change_file_output(&fid, "/p/out/a").unwrap();
        assert_eq!(m.get_file_by_id(&fid).unwrap().output, "/p/out/a.css");

        m.change_file_output(&fid, "/p/out/custom.css").unwrap();
        assert_eq!(m.get_file_by_id(&fid).unwrap().output, "/p/out/custom.css");

        assert!(m.change_file_output("nope", "/x").is_err());
    }

    #[test]
    fn broadcast_fires_per_mutation() {
        struct CountingListener(Rc<RefCell<usize>>);
        impl ChangeListener for CountingListener {
            fn data_changed(&self, _snapshot: &Snapshot) {
                *self.0.borrow_mut() += 1;
            }
        }

        let count = Rc::new(RefCell::new(0));
        let mut m = manager_with_project("/p");
        m.add_listener(Box::new(CountingListener(count.clone())));

        m.add_file("/p/a.css", "/p", true).unwrap();
        let after_add = *count.borrow();
        assert!(after_add >= 1);

        m.remove_file(&identity("/p/a.css"));
        assert!(*count.borrow() > after_add);
    }
}
