//! Process-semaphore backend (System V semaphores).
//!
//! # Key Derivation
//!
//! Each lock key maps to a placeholder file `<key_dir>/<encoded key>.sem`,
//! created the first time the key is used. `ftok(path, 'f')` turns that file
//! into a stable IPC key, so every process on the host that uses the same key
//! directory resolves the same semaphore. Key files must not be deleted while
//! processes still use them.
//!
//! # Lifetime
//!
//! Semaphore operations use `SEM_UNDO`: the kernel gives a lock back when its
//! holder exits, so there is no TTL and no leak across crashes. The flip side
//! is that only the holding process can release it; an override release from
//! any other process fails.
//!
//! # Initialization
//!
//! A new semaphore starts at 0. Its creator raises it to 1 with `semop`,
//! which also sets `sem_otime`; processes that open an existing set wait
//! until `sem_otime` is non-zero before using it.

use super::{LockBackend, RetryStrategy};
use crate::error::{LockError, Result};
use crate::locks::{Claim, Owner, ReleaseMode};
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

const BACKEND: &str = "semaphore";
const KEY_FILE_EXTENSION: &str = "sem";

/// A semaphore this adapter instance currently holds.
#[derive(Debug, Clone, Copy)]
struct Held {
    semid: i32,
    owner: Owner,
}

/// Single-host locks on System V semaphores.
#[derive(Debug)]
pub struct SemaphoreBackend {
    key_dir: PathBuf,
    held: Mutex<HashMap<String, Held>>,
}

impl SemaphoreBackend {
    /// Use `key_dir` for placeholder key files, creating it if needed.
    pub fn new<P: AsRef<Path>>(key_dir: P) -> Result<Self> {
        let key_dir = key_dir.as_ref().to_path_buf();
        sys::ensure_supported()?;
        fs::create_dir_all(&key_dir).map_err(|e| {
            LockError::unavailable(
                BACKEND,
                format!("failed to create key directory '{}': {}", key_dir.display(), e),
            )
        })?;

        Ok(Self {
            key_dir,
            held: Mutex::new(HashMap::new()),
        })
    }

    /// Directory holding the placeholder key files.
    pub fn key_dir(&self) -> &Path {
        &self.key_dir
    }

    fn held(&self) -> MutexGuard<'_, HashMap<String, Held>> {
        self.held.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Placeholder file for `key`.
    pub fn key_file(&self, key: &str) -> PathBuf {
        self.key_dir
            .join(format!("{}.{}", encode_key(key), KEY_FILE_EXTENSION))
    }

    /// Placeholder file for `key`, created if missing.
    fn ensure_key_file(&self, key: &str) -> Result<PathBuf> {
        let path = self.key_file(key);
        if !path.exists() {
            OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)
                .map_err(|e| {
                    LockError::unavailable(
                        BACKEND,
                        format!("failed to create key file '{}': {}", path.display(), e),
                    )
                })?;
        }
        Ok(path)
    }

    /// Remove the semaphore set behind every key file in the key directory.
    ///
    /// Sets outlive the processes that used them, so this is how a key
    /// directory is retired. Only safe once no process uses these keys:
    /// a holder loses its lock and blocked waiters fail. Returns how many
    /// sets were removed.
    pub fn remove_sets(&self) -> Result<usize> {
        let entries = fs::read_dir(&self.key_dir).map_err(|e| {
            LockError::unavailable(
                BACKEND,
                format!("failed to read key directory '{}': {}", self.key_dir.display(), e),
            )
        })?;

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(KEY_FILE_EXTENSION) {
                continue;
            }
            if let Some(semid) = sys::existing(&path)? {
                sys::remove(semid)?;
                removed += 1;
            }
        }

        self.held().clear();
        debug!(key_dir = %self.key_dir.display(), removed, "semaphore sets removed");
        Ok(removed)
    }

    fn claim(&self, key: &str, owner: Owner, block: bool) -> Result<Claim> {
        if let Some(held) = self.held().get(key) {
            if held.owner == owner {
                return Ok(Claim::AlreadyOwned);
            }
            if !block {
                return Ok(Claim::Held {
                    owner: Some(held.owner.id()),
                });
            }
        }

        let path = self.ensure_key_file(key)?;
        let semid = sys::open(&path)?;

        if !sys::acquire(semid, block)? {
            debug!(key, owner = %owner, "semaphore busy");
            return Ok(Claim::Held { owner: None });
        }

        self.held().insert(key.to_string(), Held { semid, owner });
        debug!(key, owner = %owner, semid, "semaphore acquired");
        Ok(Claim::Acquired)
    }
}

impl LockBackend for SemaphoreBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn try_claim(&self, key: &str, owner: Owner, _ttl: Option<Duration>) -> Result<Claim> {
        self.claim(key, owner, false)
    }

    fn claim_blocking(&self, key: &str, owner: Owner, _ttl: Option<Duration>) -> Result<Claim> {
        self.claim(key, owner, true)
    }

    fn try_release(&self, key: &str, owner: Owner, mode: ReleaseMode) -> Result<bool> {
        let mut held = self.held();
        let Some(entry) = held.get(key).copied() else {
            // Not held by this process: nobody here can release it.
            return Ok(false);
        };
        if entry.owner != owner && !mode.is_override() {
            return Ok(false);
        }

        sys::release(entry.semid)?;
        held.remove(key);
        debug!(key, owner = %owner, ?mode, "semaphore released");
        Ok(true)
    }

    fn peek(&self, key: &str) -> Result<bool> {
        if self.held().contains_key(key) {
            return Ok(true);
        }

        let path = self.key_file(key);
        if !path.exists() {
            return Ok(false);
        }
        match sys::existing(&path)? {
            Some(semid) => Ok(sys::value(semid)? == 0),
            None => Ok(false),
        }
    }

    fn enumerate(&self, prefix: &str) -> Result<Option<BTreeSet<String>>> {
        let entries = fs::read_dir(&self.key_dir).map_err(|e| {
            LockError::unavailable(
                BACKEND,
                format!("failed to read key directory '{}': {}", self.key_dir.display(), e),
            )
        })?;

        let mut keys = BTreeSet::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(KEY_FILE_EXTENSION) {
                continue;
            }
            let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(decode_key)
            else {
                warn!(path = %path.display(), "ignoring unrecognized semaphore key file");
                continue;
            };
            if key.starts_with(prefix) && self.peek(&key)? {
                keys.insert(key);
            }
        }

        Ok(Some(keys))
    }

    fn retry_strategy(&self) -> RetryStrategy {
        RetryStrategy::Native
    }

    fn location(&self) -> String {
        self.key_dir.display().to_string()
    }
}

/// Encode a lock key as a file name: `[A-Za-z0-9._:-]` pass through, all
/// other bytes become `%XX`.
pub fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b':' => {
                out.push(byte as char)
            }
            // A leading dot would hide the file; dots elsewhere are fine.
            b'.' if !out.is_empty() => out.push('.'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Inverse of [`encode_key`]. `None` for names this backend did not write.
pub fn decode_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(unix)]
mod sys {
    //! Thin wrappers over the System V semaphore calls.

    use super::BACKEND;
    use crate::error::{LockError, Result};
    use std::ffi::CString;
    use std::io;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;
    use std::thread;
    use std::time::Duration;

    const PROJECT_ID: libc::c_int = b'f' as libc::c_int;
    const INIT_POLLS: u32 = 100;

    pub fn ensure_supported() -> Result<()> {
        Ok(())
    }

    fn failure(what: &str, err: io::Error) -> LockError {
        match err.raw_os_error() {
            Some(libc::ENOSYS) => LockError::Unsupported {
                backend: BACKEND,
                reason: format!("{}: {}", what, err),
            },
            _ => LockError::unavailable(BACKEND, format!("{}: {}", what, err)),
        }
    }

    fn ipc_key(path: &Path) -> Result<libc::key_t> {
        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|e| {
            LockError::unavailable(BACKEND, format!("invalid key file path: {}", e))
        })?;

        let key = unsafe { libc::ftok(c_path.as_ptr(), PROJECT_ID) };
        if key == -1 {
            return Err(failure("ftok failed", io::Error::last_os_error()));
        }
        Ok(key)
    }

    fn semop(semid: libc::c_int, op: libc::c_short, flags: libc::c_int) -> io::Result<()> {
        let mut buf = libc::sembuf {
            sem_num: 0,
            sem_op: op,
            sem_flg: flags as libc::c_short,
        };
        loop {
            let rc = unsafe { libc::semop(semid, &mut buf, 1) };
            if rc == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EINTR) {
                return Err(err);
            }
        }
    }

    /// Open the semaphore for `path`, creating and initializing it to 1 if
    /// it does not exist yet.
    pub fn open(path: &Path) -> Result<i32> {
        let key = ipc_key(path)?;

        let semid =
            unsafe { libc::semget(key, 1, 0o666 | libc::IPC_CREAT | libc::IPC_EXCL) };
        if semid >= 0 {
            semop(semid, 1, 0).map_err(|e| failure("semaphore init failed", e))?;
            return Ok(semid);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EEXIST) {
            return Err(failure("semget failed", err));
        }

        let semid = unsafe { libc::semget(key, 1, 0o666) };
        if semid < 0 {
            return Err(failure("semget failed", io::Error::last_os_error()));
        }
        wait_initialized(semid)?;
        Ok(semid)
    }

    /// The semaphore for `path` if it already exists.
    pub fn existing(path: &Path) -> Result<Option<i32>> {
        let key = ipc_key(path)?;
        let semid = unsafe { libc::semget(key, 1, 0) };
        if semid >= 0 {
            return Ok(Some(semid));
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ENOENT) => Ok(None),
            _ => Err(failure("semget failed", err)),
        }
    }

    fn wait_initialized(semid: i32) -> Result<()> {
        for _ in 0..INIT_POLLS {
            let mut ds: libc::semid_ds = unsafe { std::mem::zeroed() };
            let rc = unsafe {
                libc::semctl(semid, 0, libc::IPC_STAT, &mut ds as *mut libc::semid_ds)
            };
            if rc < 0 {
                return Err(failure("semctl(IPC_STAT) failed", io::Error::last_os_error()));
            }
            if ds.sem_otime != 0 {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(10));
        }

        Err(LockError::unavailable(
            BACKEND,
            "semaphore was created but never initialized",
        ))
    }

    /// Decrement the semaphore. Returns `false` if it is taken and `block`
    /// is not set.
    pub fn acquire(semid: i32, block: bool) -> Result<bool> {
        let mut flags = libc::SEM_UNDO as libc::c_int;
        if !block {
            flags |= libc::IPC_NOWAIT;
        }

        match semop(semid, -1, flags) {
            Ok(()) => Ok(true),
            Err(e) if e.raw_os_error() == Some(libc::EAGAIN) => Ok(false),
            Err(e) => Err(failure("semop(acquire) failed", e)),
        }
    }

    pub fn release(semid: i32) -> Result<()> {
        semop(semid, 1, libc::SEM_UNDO as libc::c_int)
            .map_err(|e| failure("semop(release) failed", e))
    }

    /// Current semaphore value: 0 when held.
    pub fn value(semid: i32) -> Result<i32> {
        let value = unsafe { libc::semctl(semid, 0, libc::GETVAL) };
        if value < 0 {
            return Err(failure("semctl(GETVAL) failed", io::Error::last_os_error()));
        }
        Ok(value)
    }

    /// Destroy the set. A set removed concurrently by someone else is fine.
    pub fn remove(semid: i32) -> Result<()> {
        let rc = unsafe { libc::semctl(semid, 0, libc::IPC_RMID) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if !matches!(err.raw_os_error(), Some(libc::EINVAL) | Some(libc::EIDRM)) {
                return Err(failure("semctl(IPC_RMID) failed", err));
            }
        }
        Ok(())
    }
}

#[cfg(not(unix))]
mod sys {
    use super::BACKEND;
    use crate::error::{LockError, Result};
    use std::path::Path;

    fn unsupported() -> LockError {
        LockError::Unsupported {
            backend: BACKEND,
            reason: "System V semaphores are only available on Unix".to_string(),
        }
    }

    pub fn ensure_supported() -> Result<()> {
        Err(unsupported())
    }

    pub fn open(_path: &Path) -> Result<i32> {
        Err(unsupported())
    }

    pub fn existing(_path: &Path) -> Result<Option<i32>> {
        Err(unsupported())
    }

    pub fn acquire(_semid: i32, _block: bool) -> Result<bool> {
        Err(unsupported())
    }

    pub fn release(_semid: i32) -> Result<()> {
        Err(unsupported())
    }

    pub fn value(_semid: i32) -> Result<i32> {
        Err(unsupported())
    }

    pub fn remove(_semid: i32) -> Result<()> {
        Err(unsupported())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;
    use tempfile::TempDir;

    fn owner(id: u32) -> Owner {
        Owner::new(id).unwrap()
    }

    fn backend(dir: &ScratchDir) -> SemaphoreBackend {
        SemaphoreBackend::new(dir.path()).unwrap()
    }

    /// Key directory whose semaphore sets are removed with it.
    struct ScratchDir(TempDir);

    impl ScratchDir {
        fn new() -> Self {
            Self(TempDir::new().unwrap())
        }

        fn path(&self) -> &Path {
            self.0.path()
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            if let Ok(backend) = SemaphoreBackend::new(self.path()) {
                let _ = backend.remove_sets();
            }
        }
    }

    #[test]
    fn key_encoding_round_trips_unsafe_characters() {
        for key in ["feed-rebuild:42", "a/b c", ".hidden", "ünï", "x.y"] {
            let encoded = encode_key(key);
            assert!(!encoded.contains('/'));
            assert!(!encoded.starts_with('.'));
            assert_eq!(decode_key(&encoded).as_deref(), Some(key));
        }
        assert_eq!(encode_key("feed-rebuild:42"), "feed-rebuild:42");
        assert_eq!(decode_key("bad%zz"), None);
    }

    #[test]
    #[serial(semaphore)]
    fn second_owner_cannot_claim_held_key() {
        let dir = ScratchDir::new();
        let a = backend(&dir);
        let b = backend(&dir);

        assert_eq!(a.try_claim("k", owner(1), None).unwrap(), Claim::Acquired);
        assert_eq!(a.try_claim("k", owner(1), None).unwrap(), Claim::AlreadyOwned);
        assert_eq!(b.try_claim("k", owner(2), None).unwrap(), Claim::Held { owner: None });
        assert!(b.peek("k").unwrap());

        assert!(a.try_release("k", owner(1), ReleaseMode::Owner).unwrap());
        assert!(!b.peek("k").unwrap());
        assert_eq!(b.try_claim("k", owner(2), None).unwrap(), Claim::Acquired);
        assert!(b.try_release("k", owner(2), ReleaseMode::Owner).unwrap());
    }

    #[test]
    #[serial(semaphore)]
    fn override_cannot_release_another_holder() {
        let dir = ScratchDir::new();
        let a = backend(&dir);
        let b = backend(&dir);
        a.try_claim("k", owner(1), None).unwrap();

        assert!(!b.try_release("k", owner(2), ReleaseMode::Override).unwrap());
        assert!(b.peek("k").unwrap());

        assert!(a.try_release("k", owner(1), ReleaseMode::Owner).unwrap());
    }

    #[test]
    #[serial(semaphore)]
    fn stale_key_file_does_not_block() {
        let dir = ScratchDir::new();
        let db = backend(&dir);
        fs::write(db.key_file("stale"), "").unwrap();

        assert!(!db.peek("stale").unwrap());
        assert_eq!(db.try_claim("stale", owner(1), None).unwrap(), Claim::Acquired);
        assert!(db.try_release("stale", owner(1), ReleaseMode::Owner).unwrap());
    }

    #[test]
    #[serial(semaphore)]
    fn blocking_claim_waits_for_release() {
        let dir = ScratchDir::new();
        let a = Arc::new(backend(&dir));
        let b = backend(&dir);
        a.try_claim("k", owner(1), None).unwrap();

        let holder = Arc::clone(&a);
        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            holder.try_release("k", owner(1), ReleaseMode::Owner).unwrap()
        });

        let start = Instant::now();
        assert_eq!(b.claim_blocking("k", owner(2), None).unwrap(), Claim::Acquired);
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(releaser.join().unwrap());
        assert!(b.try_release("k", owner(2), ReleaseMode::Owner).unwrap());
    }

    #[test]
    #[serial(semaphore)]
    fn enumerate_lists_held_keys_only() {
        let dir = ScratchDir::new();
        let db = backend(&dir);
        db.try_claim("feed:1", owner(1), None).unwrap();
        db.try_claim("feed:2", owner(1), None).unwrap();
        db.try_release("feed:2", owner(1), ReleaseMode::Owner).unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let keys = db.enumerate("feed:").unwrap().unwrap();

        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec!["feed:1".to_string()]);
        db.try_release("feed:1", owner(1), ReleaseMode::Owner).unwrap();
    }

    #[test]
    #[serial(semaphore)]
    fn remove_sets_destroys_every_set_in_key_dir() {
        let dir = ScratchDir::new();
        let db = backend(&dir);
        db.try_claim("a", owner(1), None).unwrap();
        db.try_claim("b", owner(1), None).unwrap();
        db.try_release("b", owner(1), ReleaseMode::Owner).unwrap();

        assert_eq!(db.remove_sets().unwrap(), 2);

        for key in ["a", "b"] {
            assert!(sys::existing(&db.key_file(key)).unwrap().is_none());
            assert!(!db.peek(key).unwrap());
        }
        assert_eq!(db.remove_sets().unwrap(), 0);
    }
}
