//! The mutation engine: orchestrates insert/remove requests.
//!
//! One mutation runs locate → identity → format → lock → backup → atomic
//! write → re-validate, committing only when re-validation reports no
//! errors and restoring the pre-write snapshot otherwise. The lock is
//! scoped, so it is released on every exit path.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{error, info, info_span, warn};

use crate::backup::{BackupHandle, BackupManager, BackupPolicy};
use crate::diff;
use crate::document::LedgerDocument;
use crate::error::MutationError;
use crate::format;
use crate::guard::{FileGuard, LockOptions};
use crate::identity;
use crate::request::{
    InsertOutcome, InsertRequest, RemoveOutcome, RemoveRequest, TransactionView,
};
use crate::validate::{Diagnostics, JournalValidator, Validator};
use crate::writer;

#[derive(Clone, Debug, Default)]
pub struct EngineOptions {
    pub lock: LockOptions,
    pub backup_policy: BackupPolicy,
    /// Overrides the default `.backups` directory next to the ledger.
    pub backup_dir: Option<PathBuf>,
}

pub struct MutationEngine {
    ledger_path: PathBuf,
    options: EngineOptions,
    backups: BackupManager,
    validator: Box<dyn Validator>,
}

impl MutationEngine {
    pub fn new(ledger_path: PathBuf, options: EngineOptions) -> Self {
        let backups = match &options.backup_dir {
            Some(dir) => BackupManager::new(dir.clone()),
            None => BackupManager::for_ledger(&ledger_path),
        };
        Self {
            ledger_path,
            options,
            backups,
            validator: Box::new(JournalValidator::default()),
        }
    }

    /// Replaces the validation collaborator.
    pub fn with_validator(mut self, validator: Box<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Appends a fully specified transaction at the end of the ledger.
    pub fn insert(&self, req: &InsertRequest) -> Result<InsertOutcome, MutationError> {
        let span = info_span!("insert", dry_run = req.dry_run);
        let _enter = span.enter();

        let guard = FileGuard::acquire(self.root(), &self.options.lock)?;
        let mut doc = LedgerDocument::load(&self.ledger_path)?;
        // A dry run only needs the lock to read a consistent snapshot.
        let _lock = if req.dry_run {
            drop(guard);
            None
        } else {
            Some(guard)
        };

        let txn_id = identity::assign(req.txn_id.as_deref(), &doc)?;
        let trn = format::build_transaction(req, &txn_id)?;
        let before = doc.text().to_string();
        doc.append_transaction(trn);
        let candidate = doc.render();

        if req.dry_run {
            let diagnostics = self.validate_candidate(&candidate)?;
            return Ok(InsertOutcome {
                txn_id,
                dry_run: true,
                diagnostics,
                diff: Some(diff::render(&before, &candidate)),
                backup: None,
            });
        }

        let (diagnostics, backup) = self.commit(&candidate)?;
        info!(%txn_id, "inserted transaction");
        Ok(InsertOutcome {
            txn_id,
            dry_run: false,
            diagnostics,
            diff: None,
            backup: Some(backup.path),
        })
    }

    /// Removes the unique transaction matching the requested id and filters.
    pub fn remove(&self, req: &RemoveRequest) -> Result<RemoveOutcome, MutationError> {
        let span = info_span!("remove", txn_id = %req.txn_id, dry_run = req.dry_run);
        let _enter = span.enter();

        let guard = FileGuard::acquire(self.root(), &self.options.lock)?;
        let mut doc = LedgerDocument::load(&self.ledger_path)?;
        let _lock = if req.dry_run {
            drop(guard);
            None
        } else {
            Some(guard)
        };

        let matches = doc.find_matches(&req.txn_id, req.date, req.payee.as_deref());
        let index = match matches.as_slice() {
            [] => {
                return Err(MutationError::NotFound {
                    txn_id: req.txn_id.clone(),
                })
            }
            [index] => *index,
            // The identity invariant forbids this, but it is checked before
            // any write so a corrupted ledger never loses data here.
            _ => {
                return Err(MutationError::AmbiguousMatch {
                    txn_id: req.txn_id.clone(),
                    count: matches.len(),
                })
            }
        };

        let before = doc.text().to_string();
        let removed_raw =
            doc.remove_transaction(index)
                .ok_or_else(|| MutationError::NotFound {
                    txn_id: req.txn_id.clone(),
                })?;
        let removed = TransactionView::from_transaction(removed_raw);
        let candidate = doc.render();

        if req.dry_run {
            let diagnostics = self.validate_candidate(&candidate)?;
            return Ok(RemoveOutcome {
                txn_id: req.txn_id.clone(),
                dry_run: true,
                removed,
                diagnostics,
                diff: Some(diff::render(&before, &candidate)),
                backup: None,
            });
        }

        let (diagnostics, backup) = self.commit(&candidate)?;
        info!(txn_id = %req.txn_id, "removed transaction");
        Ok(RemoveOutcome {
            txn_id: req.txn_id.clone(),
            dry_run: false,
            removed,
            diagnostics,
            diff: None,
            backup: Some(backup.path),
        })
    }

    /// Validates the ledger as-is, without mutating anything.
    pub fn check(&self) -> Result<Diagnostics, MutationError> {
        self.validator.validate(&self.ledger_path)
    }

    /// Applies the retention policy to this ledger's backups.
    pub fn prune_backups(&self) -> Result<Vec<PathBuf>, MutationError> {
        let _guard = FileGuard::acquire(self.root(), &self.options.lock)?;
        self.backups
            .prune(&self.ledger_path, &self.options.backup_policy)
            .map_err(|source| MutationError::BackupFailed { source })
    }

    fn root(&self) -> &Path {
        match self.ledger_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    /// Snapshot → write → re-validate, rolling back to the snapshot on any
    /// failure past the snapshot.
    fn commit(&self, candidate: &str) -> Result<(Diagnostics, BackupHandle), MutationError> {
        let backup = self.backups.snapshot(&self.ledger_path)?;

        if let Err(source) = writer::write_atomic(&self.ledger_path, candidate) {
            self.rollback(&backup);
            return Err(MutationError::WriteFailed { source });
        }

        let diagnostics = match self.validator.validate(&self.ledger_path) {
            Ok(diagnostics) => diagnostics,
            Err(e) => {
                self.rollback(&backup);
                return Err(e);
            }
        };
        if diagnostics.has_errors() {
            self.rollback(&backup);
            return Err(MutationError::ValidationFailed { diagnostics });
        }

        if let Err(e) = self
            .backups
            .prune(&self.ledger_path, &self.options.backup_policy)
        {
            warn!(err = %e, "failed to prune backups");
        }
        Ok((diagnostics, backup))
    }

    fn rollback(&self, backup: &BackupHandle) {
        warn!(backup = %backup.path.display(), "rolling back ledger to pre-write snapshot");
        if let Err(e) = self.backups.restore(backup, &self.ledger_path) {
            error!(err = %e, "rollback failed; ledger may not match its snapshot");
        }
    }

    /// Validates candidate content against a throwaway copy placed next to
    /// the ledger, leaving the real file untouched.
    fn validate_candidate(&self, candidate: &str) -> Result<Diagnostics, MutationError> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".ledgermut-dryrun-")
            .suffix(".journal")
            .tempfile_in(self.root())
            .map_err(|e| MutationError::CollaboratorUnavailable {
                detail: format!("cannot stage dry-run copy: {}", e),
            })?;
        tmp.write_all(candidate.as_bytes()).map_err(|e| {
            MutationError::CollaboratorUnavailable {
                detail: format!("cannot stage dry-run copy: {}", e),
            }
        })?;
        self.validator.validate(tmp.path())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::testutil::{coffee_request, fast_lock_options, write_temp_ledger, FIXTURE};

    fn engine(path: &Path) -> MutationEngine {
        MutationEngine::new(
            path.to_path_buf(),
            EngineOptions {
                lock: fast_lock_options(),
                ..Default::default()
            },
        )
    }

    fn remove_request(txn_id: &str) -> RemoveRequest {
        RemoveRequest {
            txn_id: txn_id.to_string(),
            date: None,
            payee: None,
            dry_run: false,
        }
    }

    struct RejectingValidator;

    impl Validator for RejectingValidator {
        fn validate(&self, _path: &Path) -> Result<Diagnostics, MutationError> {
            let mut diagnostics = Diagnostics::default();
            diagnostics.push_error("injected failure".to_string(), None);
            Ok(diagnostics)
        }
    }

    struct UnavailableValidator;

    impl Validator for UnavailableValidator {
        fn validate(&self, _path: &Path) -> Result<Diagnostics, MutationError> {
            Err(MutationError::CollaboratorUnavailable {
                detail: "injected outage".to_string(),
            })
        }
    }

    #[test]
    fn insert_commits_and_is_visible_on_reparse() {
        let (_dir, path) = write_temp_ledger(FIXTURE);
        let eng = engine(&path);

        let outcome = eng.insert(&coffee_request()).expect("insert should commit");
        assert!(!outcome.dry_run);
        assert!(!outcome.diagnostics.has_errors());
        assert!(outcome.backup.is_some());
        assert!(!outcome.txn_id.is_empty());

        let doc = LedgerDocument::load(&path).expect("reload");
        let matches = doc.find_matches(&outcome.txn_id, None, None);
        assert_eq!(1, matches.len());
    }

    #[test]
    fn coffee_scenario_yields_fresh_id_and_clean_diagnostics() {
        let (_dir, path) = write_temp_ledger(FIXTURE);
        let eng = engine(&path);

        let outcome = eng.insert(&coffee_request()).expect("insert should commit");
        assert_eq!(0, outcome.diagnostics.error_count());

        let doc = LedgerDocument::load(&path).expect("reload");
        let (_, trn) = doc
            .transactions()
            .find(|(_, trn)| crate::document::txn_id_of(trn).as_deref() == Some(&outcome.txn_id))
            .expect("inserted transaction present");
        assert_eq!(2, trn.postings.len());
        assert_eq!("Expenses:Food", trn.postings[0].account);
        assert_eq!("Assets:Cash", trn.postings[1].account);
    }

    #[test]
    fn insert_commits_into_ledger_with_non_ascii_accounts() {
        let (_dir, path) = write_temp_ledger(
            r#"
            2024/01/02 * Wynajem
                ; txn_id: pl-rent
                Wydatki:Czynsz  650.00 USD
                Aktywa:Gotówka  -650.00 USD
            "#,
        );
        let eng = engine(&path);

        let outcome = eng.insert(&coffee_request()).expect("insert should commit");
        assert!(!outcome.diagnostics.has_errors(), "got {:?}", outcome.diagnostics);
        let doc = LedgerDocument::load(&path).expect("reload");
        assert!(doc.contains_txn_id(&outcome.txn_id));
        assert!(doc.contains_txn_id("pl-rent"));
    }

    #[test]
    fn unbalanced_insert_fails_validation_and_leaves_file_unchanged() {
        let (_dir, path) = write_temp_ledger(FIXTURE);
        let eng = engine(&path);
        let before = fs::read_to_string(&path).unwrap();

        let mut req = coffee_request();
        req.postings[1].amount = Some("4.00".to_string());
        match eng.insert(&req) {
            Err(MutationError::ValidationFailed { diagnostics }) => {
                assert!(diagnostics
                    .items
                    .iter()
                    .any(|d| d.message.contains("does not balance")));
            }
            other => panic!("got {:?}, want ValidationFailed", other),
        }
        assert_eq!(before, fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn injected_validator_failure_rolls_back_to_original_bytes() {
        let (_dir, path) = write_temp_ledger(FIXTURE);
        let eng = engine(&path).with_validator(Box::new(RejectingValidator));
        let before = fs::read_to_string(&path).unwrap();

        match eng.insert(&coffee_request()) {
            Err(MutationError::ValidationFailed { .. }) => {}
            other => panic!("got {:?}, want ValidationFailed", other),
        }
        assert_eq!(before, fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn unavailable_validator_rolls_back_and_surfaces_outage() {
        let (_dir, path) = write_temp_ledger(FIXTURE);
        let eng = engine(&path).with_validator(Box::new(UnavailableValidator));
        let before = fs::read_to_string(&path).unwrap();

        match eng.insert(&coffee_request()) {
            Err(MutationError::CollaboratorUnavailable { .. }) => {}
            other => panic!("got {:?}, want CollaboratorUnavailable", other),
        }
        assert_eq!(before, fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn insert_then_remove_restores_previous_bytes() {
        let (_dir, path) = write_temp_ledger(FIXTURE);
        let eng = engine(&path);

        // First commit canonicalizes the file; use that as the baseline.
        eng.insert(&coffee_request()).expect("seed insert");
        let baseline = fs::read_to_string(&path).unwrap();

        let mut req = coffee_request();
        req.txn_id = Some("tmp-book".to_string());
        eng.insert(&req).expect("insert should commit");

        let outcome = eng.remove(&remove_request("tmp-book")).expect("remove");
        assert_eq!(Some("Coffee Shop".to_string()), outcome.removed.payee);
        assert_eq!("Latte", outcome.removed.narration);
        assert_eq!(baseline, fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn remove_is_not_idempotent_second_call_is_not_found() {
        let (_dir, path) = write_temp_ledger(FIXTURE);
        let eng = engine(&path);
        let mut req = coffee_request();
        req.txn_id = Some("tmp-1".to_string());
        eng.insert(&req).expect("insert");

        eng.remove(&remove_request("tmp-1")).expect("first remove");
        match eng.remove(&remove_request("tmp-1")) {
            Err(MutationError::NotFound { txn_id }) => assert_eq!("tmp-1", txn_id),
            other => panic!("got {:?}, want NotFound", other),
        }
    }

    #[test]
    fn remove_of_unknown_id_leaves_file_byte_identical() {
        let (_dir, path) = write_temp_ledger(FIXTURE);
        let eng = engine(&path);
        let before = fs::read_to_string(&path).unwrap();

        match eng.remove(&remove_request("missing")) {
            Err(MutationError::NotFound { .. }) => {}
            other => panic!("got {:?}, want NotFound", other),
        }
        assert_eq!(before, fs::read_to_string(&path).unwrap());
        assert!(eng.backups().list(&path).expect("list").is_empty());
    }

    #[test]
    fn remove_filter_mismatch_is_not_found() {
        let (_dir, path) = write_temp_ledger(FIXTURE);
        let eng = engine(&path);

        let mut req = remove_request("fixture-rent");
        req.payee = Some("Someone Else".to_string());
        match eng.remove(&req) {
            Err(MutationError::NotFound { .. }) => {}
            other => panic!("got {:?}, want NotFound", other),
        }
    }

    #[test]
    fn duplicate_ids_in_ledger_make_removal_ambiguous() {
        let (_dir, path) = write_temp_ledger(
            r#"
            2024/01/05 * A
                ; txn_id: dup
                Expenses:Food  5.00 USD
                Assets:Cash  -5.00 USD

            2024/01/06 * B
                ; txn_id: dup
                Expenses:Food  5.00 USD
                Assets:Cash  -5.00 USD
            "#,
        );
        let eng = engine(&path);
        let before = fs::read_to_string(&path).unwrap();

        match eng.remove(&remove_request("dup")) {
            Err(MutationError::AmbiguousMatch { count, .. }) => assert_eq!(2, count),
            other => panic!("got {:?}, want AmbiguousMatch", other),
        }
        assert_eq!(before, fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn insert_with_existing_id_is_duplicate_identity() {
        let (_dir, path) = write_temp_ledger(FIXTURE);
        let eng = engine(&path);

        let mut req = coffee_request();
        req.txn_id = Some("fixture-rent".to_string());
        match eng.insert(&req) {
            Err(MutationError::DuplicateIdentity { txn_id }) => {
                assert_eq!("fixture-rent", txn_id)
            }
            other => panic!("got {:?}, want DuplicateIdentity", other),
        }
    }

    #[test]
    fn insert_rejects_id_that_would_inject_metadata_lines() {
        let (_dir, path) = write_temp_ledger(FIXTURE);
        let eng = engine(&path);
        let before = fs::read_to_string(&path).unwrap();

        let mut req = coffee_request();
        req.txn_id = Some("abc\nsneaky: 1".to_string());
        match eng.insert(&req) {
            Err(MutationError::UnrepresentableContent { field, .. }) => {
                assert_eq!("txn_id", field)
            }
            other => panic!("got {:?}, want UnrepresentableContent", other),
        }
        assert_eq!(before, fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn dry_run_insert_reports_diff_without_touching_anything() {
        let (_dir, path) = write_temp_ledger(FIXTURE);
        let eng = engine(&path);
        let before = fs::read_to_string(&path).unwrap();

        let mut req = coffee_request();
        req.dry_run = true;
        let outcome = eng.insert(&req).expect("dry run should succeed");
        assert!(outcome.dry_run);
        assert!(outcome.backup.is_none());
        let diff = outcome.diff.expect("dry run reports a diff");
        assert!(diff.contains("Coffee Shop"), "got: {}", diff);

        assert_eq!(before, fs::read_to_string(&path).unwrap());
        assert!(eng.backups().list(&path).expect("list").is_empty());
    }

    #[test]
    fn dry_run_remove_reports_diff_without_touching_anything() {
        let (_dir, path) = write_temp_ledger(FIXTURE);
        let eng = engine(&path);
        let before = fs::read_to_string(&path).unwrap();

        let mut req = remove_request("fixture-rent");
        req.dry_run = true;
        let outcome = eng.remove(&req).expect("dry run should succeed");
        assert!(outcome.diff.expect("diff").contains("Landlord"));

        assert_eq!(before, fs::read_to_string(&path).unwrap());
        assert!(eng.backups().list(&path).expect("list").is_empty());
    }

    #[test]
    fn dry_run_surfaces_validation_errors_as_diagnostics() {
        let (_dir, path) = write_temp_ledger(FIXTURE);
        let eng = engine(&path);

        let mut req = coffee_request();
        req.dry_run = true;
        req.postings[1].amount = Some("4.00".to_string());
        let outcome = eng.insert(&req).expect("dry run itself succeeds");
        assert!(outcome.diagnostics.has_errors());
    }

    #[test]
    fn contender_times_out_while_mutation_lock_is_held() {
        let (dir, path) = write_temp_ledger(FIXTURE);
        let eng = engine(&path);

        let _held = FileGuard::acquire(dir.path(), &fast_lock_options()).expect("hold lock");
        match eng.insert(&coffee_request()) {
            Err(MutationError::LockTimeout { .. }) => {}
            other => panic!("got {:?}, want LockTimeout", other),
        }
    }

    #[test]
    fn committed_mutations_accumulate_backups_and_prune_applies_policy() {
        let (_dir, path) = write_temp_ledger(FIXTURE);
        let eng = MutationEngine::new(
            path.clone(),
            EngineOptions {
                lock: fast_lock_options(),
                backup_policy: BackupPolicy {
                    max_count: Some(2),
                    max_age: None,
                },
                ..Default::default()
            },
        );

        for i in 0..4 {
            let mut req = coffee_request();
            req.txn_id = Some(format!("bulk-{}", i));
            eng.insert(&req).expect("insert");
        }
        let backups = eng.backups().list(&path).expect("list");
        assert_eq!(2, backups.len());
    }
}
