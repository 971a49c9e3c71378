//! End-to-end tests for the tally pipeline

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;
use vhe_tally::artifacts::{
    FINAL_TALLY_FILE, LOCK_FILE, METADATA_FILE, PUBLIC_KEY_FILE, SECRET_KEY_FILE,
};
use vhe_tally::audit::audit;
use vhe_tally::error::{ProviderResult, Stage};
use vhe_tally::pipeline::{run, RunOptions};
use vhe_tally::{
    ArtifactStore, Ciphertext, ContentHash, CryptoParameters, CryptoProvider, ElGamalContext,
    ElGamalProvider, Finding, Plaintext, ProviderError, PublicKey, Reduction, RunMetadata,
    SchemeParameters, SecretKey, TallyError, VoteChoice, VoteConfiguration,
};

fn scratch_dir(label: &str) -> PathBuf {
    let suffix: u64 = rand::thread_rng().gen();
    std::env::temp_dir().join(format!("vhe-tally-it-{}-{:016x}", label, suffix))
}

fn options(label: &str, reduction: Reduction) -> RunOptions {
    RunOptions {
        output_dir: scratch_dir(label),
        params: SchemeParameters::for_testing(),
        reduction,
        workers: Some(4),
    }
}

fn filenames(metadata: &RunMetadata) -> Vec<String> {
    metadata.votes.iter().map(|v| v.filename.clone()).collect()
}

enum Fault {
    /// Flip one bit in the first serialized ciphertext
    CorruptFirstCiphertext,
    /// Fail the n-th encryption (zero based)
    FailEncryption(usize),
}

/// Delegates to ElGamal, injecting a single fault
struct FaultyProvider {
    inner: ElGamalProvider,
    fault: Fault,
    calls: AtomicUsize,
}

impl FaultyProvider {
    fn new(fault: Fault) -> Self {
        FaultyProvider {
            inner: ElGamalProvider::new(),
            fault,
            calls: AtomicUsize::new(0),
        }
    }
}

impl CryptoProvider for FaultyProvider {
    type Context = ElGamalContext;
    type PublicKey = PublicKey;
    type SecretKey = SecretKey;
    type Plaintext = Plaintext;
    type Ciphertext = Ciphertext;

    fn setup_context(&self, params: &SchemeParameters) -> ProviderResult<ElGamalContext> {
        self.inner.setup_context(params)
    }

    fn parameters(&self, ctx: &ElGamalContext) -> CryptoParameters {
        self.inner.parameters(ctx)
    }

    fn generate_key_pair(&self, ctx: &ElGamalContext) -> ProviderResult<(PublicKey, SecretKey)> {
        self.inner.generate_key_pair(ctx)
    }

    fn encode(&self, ctx: &ElGamalContext, value: u64) -> ProviderResult<Plaintext> {
        self.inner.encode(ctx, value)
    }

    fn encrypt(
        &self,
        ctx: &ElGamalContext,
        pk: &PublicKey,
        pt: &Plaintext,
    ) -> ProviderResult<Ciphertext> {
        if let Fault::FailEncryption(n) = self.fault {
            if self.calls.fetch_add(1, Ordering::SeqCst) == n {
                return Err(ProviderError::CryptoError("injected failure".to_string()));
            }
        }
        self.inner.encrypt(ctx, pk, pt)
    }

    fn homomorphic_add(
        &self,
        ctx: &ElGamalContext,
        a: &Ciphertext,
        b: &Ciphertext,
    ) -> ProviderResult<Ciphertext> {
        self.inner.homomorphic_add(ctx, a, b)
    }

    fn decrypt(
        &self,
        ctx: &ElGamalContext,
        sk: &SecretKey,
        ct: &Ciphertext,
    ) -> ProviderResult<Plaintext> {
        self.inner.decrypt(ctx, sk, ct)
    }

    fn decode(&self, ctx: &ElGamalContext, pt: &Plaintext) -> ProviderResult<u64> {
        self.inner.decode(ctx, pt)
    }

    fn serialize(&self, ctx: &ElGamalContext, ct: &Ciphertext) -> ProviderResult<Vec<u8>> {
        let mut bytes = self.inner.serialize(ctx, ct)?;
        if let Fault::CorruptFirstCiphertext = self.fault {
            if self.calls.fetch_add(1, Ordering::SeqCst) != 0 {
                return Ok(bytes);
            }
            let last = bytes.len() - 1;
            bytes[last] ^= 0x01;
        }
        Ok(bytes)
    }

    fn deserialize(&self, ctx: &ElGamalContext, bytes: &[u8]) -> ProviderResult<Ciphertext> {
        self.inner.deserialize(ctx, bytes)
    }

    fn serialize_public_key(&self, ctx: &ElGamalContext, pk: &PublicKey) -> ProviderResult<Vec<u8>> {
        self.inner.serialize_public_key(ctx, pk)
    }

    fn serialize_secret_key(&self, ctx: &ElGamalContext, sk: &SecretKey) -> ProviderResult<Vec<u8>> {
        self.inner.serialize_secret_key(ctx, sk)
    }
}

#[test]
fn test_end_to_end_split_vote() {
    let options = options("split", Reduction::Parallel);
    let config = VoteConfiguration::new(10, 6, 4, "Approve the proposal?");

    let metadata = run(&ElGamalProvider::new(), &config, &options).unwrap();

    assert_eq!(metadata.results.yes_votes, 6);
    assert_eq!(metadata.results.no_votes, 4);
    assert_eq!(metadata.results.total_votes, 10);
    assert_eq!(metadata.question, "Approve the proposal?");
    assert_eq!(metadata.votes.len(), 10);

    let store = ArtifactStore::open(&options.output_dir);
    for name in [PUBLIC_KEY_FILE, SECRET_KEY_FILE, FINAL_TALLY_FILE, METADATA_FILE] {
        assert!(store.exists(name), "{} missing", name);
    }
    assert!(!store.exists(LOCK_FILE));

    let json: serde_json::Value =
        serde_json::from_slice(&fs::read(store.path(METADATA_FILE)).unwrap()).unwrap();
    assert_eq!(
        json["results"],
        serde_json::json!({"yes_votes": 6, "no_votes": 4, "total_votes": 10})
    );

    let report = audit(&store).unwrap();
    assert!(report.is_clean(), "{:?}", report.findings);
    assert_eq!(report.artifacts_checked, 11);

    fs::remove_dir_all(&options.output_dir).unwrap();
}

#[test]
fn test_end_to_end_unanimous_vote() {
    let options = options("unanimous", Reduction::Sequential);
    let config = VoteConfiguration::new(5, 5, 0, "");

    let metadata = run(&ElGamalProvider::new(), &config, &options).unwrap();

    assert_eq!(metadata.results.yes_votes, 5);
    assert_eq!(metadata.results.no_votes, 0);
    assert!(metadata.votes.iter().all(|v| v.vote == VoteChoice::Yes));
    assert_eq!(filenames(&metadata)[4], "vote_004_YES.bin");

    fs::remove_dir_all(&options.output_dir).unwrap();
}

#[test]
fn test_mismatched_counts_are_reconciled() {
    let options = options("reconcile", Reduction::Parallel);
    let config = VoteConfiguration::new(7, 4, 2, "");

    let metadata = run(&ElGamalProvider::new(), &config, &options).unwrap();

    assert_eq!(metadata.configuration.yes_votes, 5);
    assert_eq!(metadata.configuration.no_votes, 2);
    assert_eq!(metadata.results.yes_votes, 5);
    assert_eq!(metadata.results.no_votes, 2);
    assert_eq!(filenames(&metadata)[4], "vote_004_YES.bin");
    assert_eq!(filenames(&metadata)[5], "vote_005_NO.bin");

    fs::remove_dir_all(&options.output_dir).unwrap();
}

#[test]
fn test_filenames_are_reproducible_ciphertexts_are_not() {
    let config = VoteConfiguration::new(6, 2, 4, "");
    let first_opts = options("repro-a", Reduction::Parallel);
    let second_opts = options("repro-b", Reduction::Sequential);

    let first = run(&ElGamalProvider::new(), &config, &first_opts).unwrap();
    let second = run(&ElGamalProvider::new(), &config, &second_opts).unwrap();

    assert_eq!(filenames(&first), filenames(&second));
    // Encryption is probabilistic, so independent runs give different bytes
    assert_ne!(first.votes[0].hash, second.votes[0].hash);

    fs::remove_dir_all(&first_opts.output_dir).unwrap();
    fs::remove_dir_all(&second_opts.output_dir).unwrap();
}

#[test]
fn test_persisted_artifacts_decrypt_with_persisted_keys() {
    let options = options("keys", Reduction::Parallel);
    let config = VoteConfiguration::new(4, 3, 1, "");
    let metadata = run(&ElGamalProvider::new(), &config, &options).unwrap();

    let store = ArtifactStore::open(&options.output_dir);
    let pk = PublicKey::from_bytes(&fs::read(store.path(PUBLIC_KEY_FILE)).unwrap()).unwrap();
    let sk = SecretKey::from_bytes(&fs::read(store.path(SECRET_KEY_FILE)).unwrap()).unwrap();
    let provider = ElGamalProvider::new();
    let ctx = ElGamalContext::from_public_key(&options.params, &pk).unwrap();

    for vote in &metadata.votes {
        let bytes = fs::read(store.path(&vote.filename)).unwrap();
        assert_eq!(ContentHash::of(&bytes), vote.hash);

        let ct = provider.deserialize(&ctx, &bytes).unwrap();
        let restored = provider
            .deserialize(&ctx, &provider.serialize(&ctx, &ct).unwrap())
            .unwrap();
        assert_eq!(provider.decrypt_value(&ctx, &sk, &restored).unwrap(), vote.vote.value());
    }

    let tally = provider
        .deserialize(&ctx, &fs::read(store.path(FINAL_TALLY_FILE)).unwrap())
        .unwrap();
    assert_eq!(provider.decrypt_value(&ctx, &sk, &tally).unwrap(), 3);

    fs::remove_dir_all(&options.output_dir).unwrap();
}

#[test]
fn test_corrupted_ballot_fails_verification() {
    let options = options("corrupt", Reduction::Parallel);
    let config = VoteConfiguration::new(10, 6, 4, "");
    let provider = FaultyProvider::new(Fault::CorruptFirstCiphertext);

    match run(&provider, &config, &options) {
        Err(TallyError::TallyMismatch {
            expected_yes,
            expected_no,
            ..
        }) => {
            assert_eq!(expected_yes, 6);
            assert_eq!(expected_no, 4);
        }
        other => panic!("Expected TallyMismatch, got {:?}", other.map(|m| m.results)),
    }

    let store = ArtifactStore::open(&options.output_dir);
    assert!(!store.exists(METADATA_FILE));
    assert!(!store.exists(FINAL_TALLY_FILE));
    assert!(!store.exists(LOCK_FILE));
    // Ballots written before the failure are left for inspection
    assert!(store.exists("vote_000_YES.bin"));

    fs::remove_dir_all(&options.output_dir).unwrap();
}

#[test]
fn test_failed_encryption_aborts_run() {
    let options = options("encrypt-fail", Reduction::Parallel);
    let config = VoteConfiguration::new(10, 6, 4, "");
    let provider = FaultyProvider::new(Fault::FailEncryption(3));

    match run(&provider, &config, &options) {
        Err(TallyError::Provider {
            stage,
            index,
            source,
        }) => {
            assert_eq!(stage, Stage::BallotEncryption);
            assert!(matches!(index, Some(i) if i < 10), "{:?}", index);
            assert!(matches!(source, ProviderError::CryptoError(_)));
        }
        other => panic!("Expected Provider error, got {:?}", other.map(|m| m.results)),
    }

    let store = ArtifactStore::open(&options.output_dir);
    assert!(!store.exists(FINAL_TALLY_FILE));
    assert!(!store.exists(METADATA_FILE));
    assert!(!store.exists(LOCK_FILE));

    fs::remove_dir_all(&options.output_dir).unwrap();
}

#[test]
fn test_rerun_with_fewer_voters_clears_old_ballots() {
    let options = options("rerun", Reduction::Parallel);
    run(&ElGamalProvider::new(), &VoteConfiguration::new(10, 6, 4, ""), &options).unwrap();
    let metadata = run(&ElGamalProvider::new(), &VoteConfiguration::new(5, 2, 3, ""), &options).unwrap();

    let store = ArtifactStore::open(&options.output_dir);
    assert_eq!(store.ballot_files(Stage::Audit).unwrap(), filenames(&metadata));
    assert!(!store.exists("vote_009_NO.bin"));
    assert!(audit(&store).unwrap().is_clean());

    fs::remove_dir_all(&options.output_dir).unwrap();
}

#[test]
fn test_tampered_ballot_file_detected_by_audit() {
    let options = options("audit", Reduction::Parallel);
    let config = VoteConfiguration::new(3, 1, 2, "");
    run(&ElGamalProvider::new(), &config, &options).unwrap();

    let store = ArtifactStore::open(&options.output_dir);
    let path = store.path("vote_002_NO.bin");
    let mut bytes = fs::read(&path).unwrap();
    bytes[0] ^= 0xff;
    fs::write(&path, bytes).unwrap();

    let report = audit(&store).unwrap();
    assert!(!report.is_clean());
    assert!(matches!(
        &report.findings[..],
        [Finding::HashMismatch { filename, .. }] if filename == "vote_002_NO.bin"
    ));

    fs::remove_dir_all(&options.output_dir).unwrap();
}

#[test]
fn test_locked_directory_rejects_second_run() {
    let options = options("locked", Reduction::Parallel);
    let store = ArtifactStore::create(&options.output_dir).unwrap();
    let _lock = store.lock().unwrap();

    match run(&ElGamalProvider::new(), &VoteConfiguration::new(2, 1, 1, ""), &options) {
        Err(TallyError::Io { path, .. }) => assert!(path.ends_with(LOCK_FILE)),
        other => panic!("Expected Io error, got {:?}", other.map(|m| m.results)),
    }

    drop(_lock);
    fs::remove_dir_all(&options.output_dir).unwrap();
}

#[test]
fn test_zero_voters_is_configuration_error() {
    let options = options("empty", Reduction::Parallel);
    assert!(matches!(
        run(&ElGamalProvider::new(), &VoteConfiguration::new(0, 0, 0, ""), &options),
        Err(TallyError::Configuration(_))
    ));
    assert!(!options.output_dir.exists());
}
