//! Incremental static-page generator for the dictionary.
//!
//! Each run hashes every term file, re-renders only those whose digest
//! differs from the manifest (or all of them when forced), prunes manifest
//! entries for deleted files and saves the manifest. A broken term file is
//! reported and skipped; it never aborts the run.

mod config;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use floundermode_api::{merge_tallies, BackendConfig, BackendKind, DictionaryApi};
use floundermode_core::{
    digest, normalize, ContentDigest, DictionaryError, PageRenderer, PageTemplate, TermFile,
    TermRecord, VoteTally,
};
use floundermode_store::{discover_term_files, ManifestStore, TermFileEntry};
use serde::Serialize;

pub use config::{SiteConfig, DEFAULT_CONFIG_FILE};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("terms directory not found: {}", .0.display())]
    MissingTermsDir(PathBuf),
    #[error("page template not found: {}", .0.display())]
    MissingTemplate(PathBuf),
    #[error("page template is invalid: {0}")]
    InvalidTemplate(DictionaryError),
    #[error("I/O error at {}: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },
    #[error("manifest error: {0}")]
    Manifest(String),
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    pub force_regenerate: bool,
    pub verbose: bool,
}

/// A term file that could not be rendered. Its manifest entry is left
/// untouched so the next run retries it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileFailure {
    pub file_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct BuildSummary {
    pub new: Vec<String>,
    pub changed: Vec<String>,
    /// Forced re-renders of files whose digest did not change.
    pub regenerated: Vec<String>,
    pub unchanged: Vec<String>,
    pub pruned: Vec<String>,
    pub failures: Vec<FileFailure>,
}

impl BuildSummary {
    #[must_use]
    pub fn written(&self) -> usize {
        self.new.len() + self.changed.len() + self.regenerated.len()
    }
}

/// Live tally lookup used when rendering with current votes.
pub trait VoteSource {
    /// # Errors
    /// Returns a description of the failure; callers fall back to file counts.
    fn tallies(&self, definition_ids: &[String]) -> Result<BTreeMap<String, VoteTally>, String>;
}

impl VoteSource for DictionaryApi {
    fn tallies(&self, definition_ids: &[String]) -> Result<BTreeMap<String, VoteTally>, String> {
        self.client().vote_tallies(definition_ids).map_err(|err| err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    New,
    Changed,
    Regenerated,
    Unchanged,
}

/// Check the fatal preconditions and load the page template.
///
/// # Errors
/// Returns [`BuildError::MissingTermsDir`] or [`BuildError::MissingTemplate`]
/// when either input is absent, [`BuildError::Io`] when the template exists
/// but cannot be read, and [`BuildError::InvalidTemplate`] when it lacks a
/// required placeholder.
pub fn prepare_renderer(config: &SiteConfig) -> Result<PageRenderer, BuildError> {
    if !config.terms_dir.is_dir() {
        return Err(BuildError::MissingTermsDir(config.terms_dir.clone()));
    }
    let source = match fs::read_to_string(&config.template) {
        Ok(source) => source,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(BuildError::MissingTemplate(config.template.clone()));
        }
        Err(source) => return Err(BuildError::Io { path: config.template.clone(), source }),
    };
    let template = PageTemplate::new(source).map_err(BuildError::InvalidTemplate)?;
    Ok(PageRenderer::new(template, &config.base_url))
}

/// Open the vote source used for live tallies, if `live_votes` is enabled.
///
/// The local backend only has tallies when it is pointed at the site's vote
/// database; without `votes_db` live votes are disabled with a warning.
#[must_use]
pub fn live_vote_source(config: &SiteConfig, backend: &BackendConfig) -> Option<DictionaryApi> {
    if !config.live_votes {
        return None;
    }
    if backend.kind == BackendKind::Local && config.votes_db.is_none() {
        tracing::warn!("live votes need votes_db with the local backend; rendering file counts");
        return None;
    }
    match DictionaryApi::from_config(
        backend,
        Some(config.terms_dir.as_path()),
        config.votes_db.as_deref(),
    ) {
        Ok(api) => Some(api),
        Err(err) => {
            tracing::warn!(error = %err, "live votes disabled; rendering file counts");
            None
        }
    }
}

/// Which term file owns each definition id seen in this run.
#[derive(Debug, Default)]
struct DefinitionIds {
    owners: BTreeMap<String, String>,
}

impl DefinitionIds {
    /// Claim every id of `record` for `file_id`, or claim none of them.
    fn claim(&mut self, file_id: &str, record: &TermRecord) -> Result<(), String> {
        let mut own = BTreeSet::new();
        for definition in &record.definitions {
            if !own.insert(definition.id.as_str()) {
                return Err(format!("definition id {} appears twice", definition.id));
            }
            match self.owners.get(&definition.id) {
                Some(owner) if owner != file_id => {
                    return Err(format!(
                        "definition id {} is already used by {owner}",
                        definition.id
                    ));
                }
                _ => {}
            }
        }
        for definition in &record.definitions {
            self.owners.insert(definition.id.clone(), file_id.to_string());
        }
        Ok(())
    }
}

/// A term file that has to be rendered this run.
struct DirtyFile<'a> {
    entry: &'a TermFileEntry,
    classification: Classification,
    digest: ContentDigest,
    bytes: Vec<u8>,
}

/// Run one incremental build.
///
/// Unchanged files keep the definition ids they were published with; a dirty
/// file reusing one of those ids, or an id claimed by an earlier dirty file,
/// is reported as a failure and not written.
///
/// # Errors
/// Returns a [`BuildError`] for the fatal conditions only: missing inputs,
/// an unwritable output directory, or a manifest that cannot be saved.
pub fn run(
    config: &SiteConfig,
    options: BuildOptions,
    votes: Option<&dyn VoteSource>,
) -> Result<BuildSummary, BuildError> {
    let renderer = prepare_renderer(config)?;
    let entries = discover_term_files(&config.terms_dir)
        .map_err(|_| BuildError::MissingTermsDir(config.terms_dir.clone()))?;
    fs::create_dir_all(&config.output_dir)
        .map_err(|source| BuildError::Io { path: config.output_dir.clone(), source })?;

    let mut manifest = ManifestStore::load(&config.manifest);
    let mut summary = BuildSummary::default();
    let mut ids = DefinitionIds::default();
    let mut dirty = Vec::new();

    for entry in &entries {
        let bytes = match fs::read(&entry.path) {
            Ok(bytes) => bytes,
            Err(err) => {
                let reason = format!("failed to read: {err}");
                tracing::warn!(file_id = %entry.file_id, %reason, "failed to build term page");
                summary.failures.push(FileFailure { file_id: entry.file_id.clone(), reason });
                continue;
            }
        };
        let current = digest(&bytes);
        let classification = match manifest.digest_for(&entry.file_id) {
            None => Classification::New,
            Some(previous) if previous != current => Classification::Changed,
            Some(_) if options.force_regenerate => Classification::Regenerated,
            Some(_) => Classification::Unchanged,
        };

        if classification == Classification::Unchanged {
            if let Ok(file) = TermFile::parse(&bytes) {
                if let Err(reason) = ids.claim(&entry.file_id, &normalize(&file)) {
                    tracing::warn!(file_id = %entry.file_id, %reason, "published page shares an id");
                }
            }
            if options.verbose {
                tracing::info!(file_id = %entry.file_id, "unchanged");
            } else {
                tracing::debug!(file_id = %entry.file_id, "unchanged");
            }
            summary.unchanged.push(entry.file_id.clone());
        } else {
            dirty.push(DirtyFile { entry, classification, digest: current, bytes });
        }
    }

    for file in dirty {
        let file_id = &file.entry.file_id;
        match build_page(&file, config, &renderer, &mut ids, votes) {
            Ok(()) => {
                manifest.record_digest(file_id, file.digest);
                let bucket = match file.classification {
                    Classification::New => &mut summary.new,
                    Classification::Changed => &mut summary.changed,
                    Classification::Regenerated | Classification::Unchanged => {
                        &mut summary.regenerated
                    }
                };
                tracing::info!(file_id = %file_id, classification = ?file.classification, "page written");
                bucket.push(file_id.clone());
            }
            Err(reason) => {
                tracing::warn!(file_id = %file_id, %reason, "failed to build term page");
                summary.failures.push(FileFailure { file_id: file_id.clone(), reason });
            }
        }
    }

    let current = entries.iter().map(|entry| entry.file_id.clone()).collect::<BTreeSet<_>>();
    summary.pruned = manifest.prune(&current);
    for file_id in &summary.pruned {
        tracing::info!(file_id = %file_id, "pruned from manifest");
    }
    manifest.save().map_err(|err| BuildError::Manifest(format!("{err:#}")))?;

    Ok(summary)
}

fn build_page(
    file: &DirtyFile<'_>,
    config: &SiteConfig,
    renderer: &PageRenderer,
    ids: &mut DefinitionIds,
    votes: Option<&dyn VoteSource>,
) -> Result<(), String> {
    let parsed = TermFile::parse(&file.bytes).map_err(|err| err.to_string())?;
    let mut record = normalize(&parsed);
    record.validate().map_err(|err| err.to_string())?;
    ids.claim(&file.entry.file_id, &record)?;
    if let Some(votes) = votes {
        apply_live_votes(&mut record, votes);
    }
    let page = renderer
        .render_page(&record, page_name(file.entry))
        .map_err(|err| err.to_string())?;

    let output = output_path(&config.output_dir, file.entry);
    fs::write(&output, page).map_err(|err| format!("failed to write {}: {err}", output.display()))
}

fn apply_live_votes(record: &mut TermRecord, votes: &dyn VoteSource) {
    let ids = record.definitions.iter().map(|definition| definition.id.clone()).collect::<Vec<_>>();
    match votes.tallies(&ids) {
        Ok(tallies) => {
            record.definitions = merge_tallies(std::mem::take(&mut record.definitions), &tallies);
        }
        Err(reason) => {
            tracing::warn!(term = %record.term, %reason, "live votes unavailable; using file counts");
        }
    }
}

/// Published page name: the term file's stem.
fn page_name(entry: &TermFileEntry) -> &str {
    entry.file_id.strip_suffix(".json").unwrap_or(&entry.file_id)
}

/// `<output_dir>/<term-file stem>.html`
#[must_use]
pub fn output_path(output_dir: &Path, entry: &TermFileEntry) -> PathBuf {
    output_dir.join(format!("{}.html", page_name(entry)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str =
        "<html><head><title>{{TERM}}</title></head><body>{{RELATED}}{{DEFINITIONS}}{{SHARE_LINKS}}</body></html>";

    struct Workspace {
        root: PathBuf,
        config: SiteConfig,
    }

    impl Workspace {
        fn new() -> Self {
            let root =
                std::env::temp_dir().join(format!("floundermode-build-{}", ulid::Ulid::new()));
            let config = SiteConfig {
                terms_dir: root.join("terms"),
                output_dir: root.join("site/terms"),
                template: root.join("templates/term.html"),
                manifest: root.join("site/terms-manifest.json"),
                base_url: "https://floundermode.example".to_string(),
                live_votes: false,
                votes_db: None,
            };
            for dir in [&config.terms_dir, &root.join("templates")] {
                if let Err(err) = fs::create_dir_all(dir) {
                    panic!("failed to create {}: {err}", dir.display());
                }
            }
            if let Err(err) = fs::write(&config.template, TEMPLATE) {
                panic!("failed to write template: {err}");
            }
            Self { root, config }
        }

        fn write_term(&self, name: &str, content: &str) {
            if let Err(err) = fs::write(self.config.terms_dir.join(name), content) {
                panic!("failed to write {name}: {err}");
            }
        }

        fn page(&self, stem: &str) -> PathBuf {
            self.config.output_dir.join(format!("{stem}.html"))
        }
    }

    impl Drop for Workspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    const MVP_THEATER: &str = r#"{"term":"MVP Theater","related":["startup"],"definition":"Shipping a demo and calling it a product.","usage":"Their launch was pure MVP theater."}"#;

    #[test]
    fn first_run_is_new_and_second_run_is_unchanged() -> Result<(), BuildError> {
        let workspace = Workspace::new();
        workspace.write_term("mvp-theater.json", MVP_THEATER);

        let first = run(&workspace.config, BuildOptions::default(), None)?;
        assert_eq!(first.new, ["mvp-theater.json".to_string()]);
        assert!(workspace.page("mvp-theater").is_file());

        let manifest = ManifestStore::load(&workspace.config.manifest);
        assert_eq!(manifest.digest_for("mvp-theater.json"), Some(digest(MVP_THEATER.as_bytes())));

        let modified = fs::metadata(workspace.page("mvp-theater"))
            .and_then(|meta| meta.modified())
            .map_err(|source| BuildError::Io { path: workspace.page("mvp-theater"), source })?;
        let second = run(&workspace.config, BuildOptions::default(), None)?;
        assert!(second.new.is_empty() && second.changed.is_empty());
        assert_eq!(second.unchanged, ["mvp-theater.json".to_string()]);
        let after = fs::metadata(workspace.page("mvp-theater"))
            .and_then(|meta| meta.modified())
            .map_err(|source| BuildError::Io { path: workspace.page("mvp-theater"), source })?;
        assert_eq!(modified, after);
        Ok(())
    }

    #[test]
    fn edits_are_changed_and_force_regenerates_everything() -> Result<(), BuildError> {
        let workspace = Workspace::new();
        workspace.write_term("mvp-theater.json", MVP_THEATER);
        workspace.write_term(
            "pivot.json",
            r#"{"term":"Pivot","related":[],"definition":"Renaming the failure.","usage":""}"#,
        );
        run(&workspace.config, BuildOptions::default(), None)?;

        workspace.write_term(
            "pivot.json",
            r#"{"term":"Pivot","related":[],"definition":"Renaming the failure, again.","usage":""}"#,
        );
        let edited = run(&workspace.config, BuildOptions::default(), None)?;
        assert_eq!(edited.changed, ["pivot.json".to_string()]);
        assert_eq!(edited.unchanged, ["mvp-theater.json".to_string()]);

        let forced =
            run(&workspace.config, BuildOptions { force_regenerate: true, verbose: false }, None)?;
        assert_eq!(forced.regenerated.len(), 2);
        assert!(forced.unchanged.is_empty());
        Ok(())
    }

    #[test]
    fn broken_files_are_skipped_and_retried() -> Result<(), BuildError> {
        let workspace = Workspace::new();
        workspace.write_term("mvp-theater.json", MVP_THEATER);
        workspace.write_term("broken.json", "{ \"term\": ");
        workspace.write_term("empty.json", r#"{"term":"Empty","related":[],"definitions":[]}"#);

        let summary = run(&workspace.config, BuildOptions::default(), None)?;
        assert_eq!(summary.new, ["mvp-theater.json".to_string()]);
        let failed = summary.failures.iter().map(|f| f.file_id.as_str()).collect::<Vec<_>>();
        assert_eq!(failed, ["broken.json", "empty.json"]);

        let manifest = ManifestStore::load(&workspace.config.manifest);
        assert!(manifest.digest_for("broken.json").is_none());

        let again = run(&workspace.config, BuildOptions::default(), None)?;
        assert_eq!(again.failures.len(), 2);
        Ok(())
    }

    #[test]
    fn deleted_files_are_pruned_from_the_manifest() -> Result<(), BuildError> {
        let workspace = Workspace::new();
        workspace.write_term("a.json", r#"{"term":"A","related":[],"definition":"First.","usage":""}"#);
        workspace.write_term("b.json", r#"{"term":"B","related":[],"definition":"Second.","usage":""}"#);
        run(&workspace.config, BuildOptions::default(), None)?;

        if let Err(err) = fs::remove_file(workspace.config.terms_dir.join("b.json")) {
            panic!("failed to remove b.json: {err}");
        }
        let summary = run(&workspace.config, BuildOptions::default(), None)?;
        assert_eq!(summary.pruned, ["b.json".to_string()]);

        let manifest = ManifestStore::load(&workspace.config.manifest);
        assert!(manifest.digest_for("b.json").is_none());
        assert_eq!(manifest.manifest().terms, ["a.json".to_string()]);
        Ok(())
    }

    #[test]
    fn missing_inputs_are_fatal() {
        let workspace = Workspace::new();
        let mut config = workspace.config.clone();
        config.template = workspace.root.join("templates/missing.html");
        assert!(matches!(
            run(&config, BuildOptions::default(), None),
            Err(BuildError::MissingTemplate(_))
        ));

        config.template = workspace.root.join("templates");
        assert!(matches!(
            run(&config, BuildOptions::default(), None),
            Err(BuildError::Io { .. })
        ));

        config.terms_dir = workspace.root.join("nope");
        assert!(matches!(
            run(&config, BuildOptions::default(), None),
            Err(BuildError::MissingTermsDir(_))
        ));
    }

    struct FixedVotes(Result<BTreeMap<String, VoteTally>, String>);

    impl VoteSource for FixedVotes {
        fn tallies(&self, _ids: &[String]) -> Result<BTreeMap<String, VoteTally>, String> {
            self.0.clone()
        }
    }

    #[test]
    fn live_votes_reorder_definitions_and_failures_fall_back() -> Result<(), BuildError> {
        let workspace = Workspace::new();
        workspace.write_term(
            "synergy.json",
            r#"{"term":"Synergy","related":[],"definitions":[
                {"definition":"FIRST-DEFINITION","usage":"","upvotes":3},
                {"definition":"SECOND-DEFINITION","usage":"","upvotes":1}
            ]}"#,
        );

        let boosted = FixedVotes(Ok(BTreeMap::from([(
            "synergy-def-2".to_string(),
            VoteTally::new(5, 0),
        )])));
        run(&workspace.config, BuildOptions::default(), Some(&boosted as &dyn VoteSource))?;
        let page = fs::read_to_string(workspace.page("synergy"))
            .map_err(|source| BuildError::Io { path: workspace.page("synergy"), source })?;
        let first = page.find("FIRST-DEFINITION").unwrap_or(usize::MAX);
        let second = page.find("SECOND-DEFINITION").unwrap_or(usize::MAX);
        assert!(second < first);

        let failing = FixedVotes(Err("backend down".to_string()));
        run(
            &workspace.config,
            BuildOptions { force_regenerate: true, verbose: true },
            Some(&failing as &dyn VoteSource),
        )?;
        let page = fs::read_to_string(workspace.page("synergy"))
            .map_err(|source| BuildError::Io { path: workspace.page("synergy"), source })?;
        assert!(page.find("FIRST-DEFINITION") < page.find("SECOND-DEFINITION"));
        Ok(())
    }

    const GROWTH_HACKING: &str = r#"{"term":"Growth Hacking","related":[],"definition":"Buying users and calling it virality.","usage":""}"#;

    #[test]
    fn share_links_point_at_the_written_page() -> Result<(), BuildError> {
        let workspace = Workspace::new();
        workspace.write_term("growth.json", GROWTH_HACKING);
        run(&workspace.config, BuildOptions::default(), None)?;

        let page = fs::read_to_string(workspace.page("growth"))
            .map_err(|source| BuildError::Io { path: workspace.page("growth"), source })?;
        assert!(page.contains("https://floundermode.example/terms/growth.html"));
        assert!(!page.contains("growth-hacking.html"));
        assert!(!workspace.page("growth-hacking").exists());
        Ok(())
    }

    #[test]
    fn duplicate_definition_ids_fail_the_later_file() -> Result<(), BuildError> {
        let workspace = Workspace::new();
        workspace.write_term("growth-hacking-2.json", GROWTH_HACKING);
        workspace.write_term("growth.json", GROWTH_HACKING);

        let summary = run(&workspace.config, BuildOptions::default(), None)?;
        assert_eq!(summary.new, ["growth-hacking-2.json".to_string()]);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].file_id, "growth.json");
        assert!(summary.failures[0].reason.contains("growth-hacking-def-1"));
        assert!(!workspace.page("growth").exists());

        let manifest = ManifestStore::load(&workspace.config.manifest);
        assert!(manifest.digest_for("growth.json").is_none());

        let again = run(&workspace.config, BuildOptions::default(), None)?;
        assert_eq!(again.unchanged, ["growth-hacking-2.json".to_string()]);
        assert_eq!(again.failures.len(), 1);
        Ok(())
    }

    #[test]
    fn repeated_explicit_ids_within_a_file_are_rejected() -> Result<(), BuildError> {
        let workspace = Workspace::new();
        workspace.write_term(
            "pivot.json",
            r#"{"term":"Pivot","related":[],"definitions":[
                {"id":"pivot-a","definition":"One.","usage":""},
                {"id":"pivot-a","definition":"Two.","usage":""}
            ]}"#,
        );
        let summary = run(&workspace.config, BuildOptions::default(), None)?;
        assert!(summary.new.is_empty());
        assert!(summary.failures[0].reason.contains("appears twice"));
        Ok(())
    }

    #[test]
    fn local_live_votes_read_the_configured_database() -> Result<(), BuildError> {
        let workspace = Workspace::new();
        workspace.write_term("synergy.json", MVP_THEATER.replace("MVP Theater", "Synergy").as_str());
        let backend = BackendConfig::default();

        let mut config = workspace.config.clone();
        assert!(live_vote_source(&config, &backend).is_none());

        config.live_votes = true;
        assert!(live_vote_source(&config, &backend).is_none());

        let db = workspace.root.join("votes.sqlite3");
        let mut store = floundermode_store::SqliteVoteStore::open(&db)
            .unwrap_or_else(|err| panic!("failed to open vote store: {err:#}"));
        if let Err(err) = store.migrate() {
            panic!("failed to migrate vote store: {err:#}");
        }
        if let Err(err) = store.cast_vote("synergy-def-1", "user-1", floundermode_core::VoteType::Up) {
            panic!("failed to cast vote: {err:#}");
        }
        drop(store);

        config.votes_db = Some(db);
        let Some(api) = live_vote_source(&config, &backend) else {
            panic!("live votes should be enabled with a vote database");
        };
        let tallies = api
            .tallies(&["synergy-def-1".to_string()])
            .unwrap_or_else(|reason| panic!("tallies failed: {reason}"));
        assert_eq!(tallies.get("synergy-def-1").map(|tally| tally.upvotes), Some(1));

        run(&config, BuildOptions::default(), Some(&api as &dyn VoteSource))?;
        let page = fs::read_to_string(workspace.page("synergy"))
            .map_err(|source| BuildError::Io { path: workspace.page("synergy"), source })?;
        assert!(page.contains("data-score-for=\"synergy-def-1\">1</span>"));
        Ok(())
    }
}
