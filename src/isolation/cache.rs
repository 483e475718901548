//! Host-side package download caches shared with calf VMs.
//!
//! Each ecosystem gets one directory under `~/.calf-cache`. Inside a VM the
//! same path is a symlink to the directory-share mount, so every destructive
//! operation classifies the path with `symlink_metadata` before touching it.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, SecondsFormat};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::IsolationError;
use crate::cmd::Cmd;

/// Directory name under the home directory holding every cache.
pub const CACHE_BASE_DIR: &str = ".calf-cache";

/// Directory-share spec that exposes the cache base inside a VM.
const SHARED_CACHE_MOUNT: &str = "calf-cache:~/.calf-cache";

/// Where the directory share appears inside a macOS guest.
const VM_SHARED_FILES: &str = "/Volumes/My Shared Files/calf-cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheType {
    Homebrew,
    Npm,
    Go,
    Git,
}

impl CacheType {
    pub const ALL: [CacheType; 4] = [
        CacheType::Homebrew,
        CacheType::Npm,
        CacheType::Go,
        CacheType::Git,
    ];

    /// Directory name under the cache base, also the CLI spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            CacheType::Homebrew => "homebrew",
            CacheType::Npm => "npm",
            CacheType::Go => "go",
            CacheType::Git => "git",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CacheType::Homebrew => "Homebrew",
            CacheType::Npm => "npm",
            CacheType::Go => "Go",
            CacheType::Git => "Git",
        }
    }

    /// Ecosystem-specific directories created below the cache root.
    fn substructure(self) -> &'static [&'static str] {
        match self {
            CacheType::Homebrew => &["downloads", "Cask"],
            CacheType::Go => &["pkg/mod", "pkg/sumdb"],
            CacheType::Npm | CacheType::Git => &[],
        }
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheType {
    type Err = IsolationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "homebrew" => Ok(CacheType::Homebrew),
            "npm" => Ok(CacheType::Npm),
            "go" => Ok(CacheType::Go),
            "git" => Ok(CacheType::Git),
            _ => Err(IsolationError::InvalidCacheType(s.to_string())),
        }
    }
}

/// Snapshot of one cache directory.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub cache_type: CacheType,
    pub host_path: PathBuf,
    /// Apparent size: sum of regular file lengths at the resolved location.
    pub size_bytes: u64,
    pub available: bool,
    /// Modification time of the cache path, when it exists.
    pub last_access: Option<SystemTime>,
}

pub struct CacheManager {
    home_dir: Option<PathBuf>,
    cache_base_dir: PathBuf,
    resolve_symlinks: bool,
}

impl CacheManager {
    /// Manager rooted at `~/.calf-cache`, following VM-share symlinks.
    pub fn new() -> Self {
        let home_dir = home::home_dir();
        let cache_base_dir = home_dir
            .as_deref()
            .map(|h| h.join(CACHE_BASE_DIR))
            .unwrap_or_else(|| PathBuf::from(CACHE_BASE_DIR));
        Self {
            home_dir,
            cache_base_dir,
            resolve_symlinks: true,
        }
    }

    /// Manager with an explicit base directory. Symlink resolution is off.
    pub fn with_base_dir(home_dir: Option<PathBuf>, cache_base_dir: PathBuf) -> Self {
        Self {
            home_dir,
            cache_base_dir,
            resolve_symlinks: false,
        }
    }

    #[cfg(test)]
    pub fn resolve_symlinks(mut self, enabled: bool) -> Self {
        self.resolve_symlinks = enabled;
        self
    }

    pub fn cache_base_dir(&self) -> &Path {
        &self.cache_base_dir
    }

    pub fn cache_path(&self, cache_type: CacheType) -> PathBuf {
        self.cache_base_dir.join(cache_type.as_str())
    }

    pub fn shared_cache_mount(&self) -> &'static str {
        SHARED_CACHE_MOUNT
    }

    /// Ensure the cache directory and its substructure exist.
    ///
    /// Without a home directory this only warns: caching speeds up bootstraps
    /// but nothing depends on it.
    pub fn setup(&self, cache_type: CacheType) -> Result<()> {
        if self.home_dir.is_none() {
            warn!(cache = %cache_type, "home directory unavailable, skipping cache setup");
            eprintln!(
                "Warning: home directory not available, continuing without {} cache",
                cache_type.label()
            );
            return Ok(());
        }

        let root = self.cache_path(cache_type);
        fs::create_dir_all(&root).with_context(|| {
            format!(
                "Failed to create {} cache directory at {}",
                cache_type.label(),
                root.display()
            )
        })?;

        for sub in cache_type.substructure() {
            let dir = root.join(sub);
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        debug!(cache = %cache_type, path = %root.display(), "cache:setup");
        Ok(())
    }

    pub fn setup_all(&self) -> Result<()> {
        for cache_type in CacheType::ALL {
            self.setup(cache_type)?;
        }
        Ok(())
    }

    /// Report availability, size and last access for a cache. A missing
    /// cache is reported as unavailable, never as an error.
    pub fn info(&self, cache_type: CacheType) -> Result<CacheEntry> {
        let host_path = self.cache_path(cache_type);

        let metadata = match fs::metadata(&host_path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(CacheEntry {
                    cache_type,
                    host_path,
                    size_bytes: 0,
                    available: false,
                    last_access: None,
                });
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to stat {} cache directory", cache_type.label())
                });
            }
        };

        // With resolution off a symlinked cache is measured as the link alone.
        let size_bytes = match self.resolve_real_cache_path(&host_path)? {
            Some(target) => apparent_size(&target, true),
            None => apparent_size(&host_path, self.resolve_symlinks),
        };

        Ok(CacheEntry {
            cache_type,
            host_path,
            size_bytes,
            available: true,
            last_access: metadata.modified().ok(),
        })
    }

    /// Follow a cache symlink to the shared-volume directory it points at.
    ///
    /// Returns `None` when resolution is disabled, the path is missing, the
    /// path is not a symlink, or the link target does not exist.
    pub fn resolve_real_cache_path(&self, path: &Path) -> Result<Option<PathBuf>> {
        if !self.resolve_symlinks {
            return Ok(None);
        }
        symlink_target(path)
    }

    /// Empty a cache. Returns whether anything was (or, with `dry_run`, would
    /// be) cleared; a cache that does not exist yields `false`, as does a
    /// symlinked cache that [`CacheManager::resolve_real_cache_path`] does not
    /// resolve.
    pub fn clear(&self, cache_type: CacheType, dry_run: bool) -> Result<bool> {
        if self.home_dir.is_none() {
            return Err(IsolationError::HomeUnavailable.into());
        }

        let path = self.cache_path(cache_type);
        let metadata = match fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to check {} cache directory", cache_type.label())
                });
            }
        };

        if metadata.file_type().is_symlink() {
            // The link is the VM mount point; only its target is emptied.
            // Dangling links and links seen with resolution off are left alone.
            let Some(target) = self.resolve_real_cache_path(&path)? else {
                debug!(
                    cache = %cache_type,
                    resolve_symlinks = self.resolve_symlinks,
                    "cache:clear symlink not followed"
                );
                return Ok(false);
            };
            if dry_run {
                info!(cache = %cache_type, target = %target.display(), "cache:clear dry run");
                return Ok(true);
            }
            clear_contents(&target).with_context(|| {
                format!(
                    "Failed to clear {} cache contents at {}",
                    cache_type.label(),
                    target.display()
                )
            })?;
            info!(cache = %cache_type, target = %target.display(), "cache:cleared symlinked cache");
            return Ok(true);
        }

        if !metadata.is_dir() {
            bail!("cache path is not a directory: {}", path.display());
        }

        if dry_run {
            info!(cache = %cache_type, path = %path.display(), "cache:clear dry run");
            return Ok(true);
        }

        remove_all_with_perm_fix(&path)
            .with_context(|| format!("Failed to remove {} cache directory", cache_type.label()))?;
        self.setup(cache_type)
            .with_context(|| format!("Failed to recreate {} cache directory", cache_type.label()))?;
        info!(cache = %cache_type, path = %path.display(), "cache:cleared");
        Ok(true)
    }

    /// Shell commands that link the VM-side cache path to the shared mount and
    /// point the ecosystem at it. Empty when the host cache is not set up.
    pub fn vm_setup_commands(&self, cache_type: CacheType) -> Vec<String> {
        if self.home_dir.is_none() || !self.cache_path(cache_type).exists() {
            return Vec::new();
        }

        let vm_cache_dir = format!("~/{}/{}", CACHE_BASE_DIR, cache_type);
        let shared = format!("\"{}/{}\"", VM_SHARED_FILES, cache_type);

        let mut commands = vec![
            format!("mkdir -p ~/{}", CACHE_BASE_DIR),
            format!("ln -sf {} {}", shared, vm_cache_dir),
        ];
        match cache_type {
            CacheType::Homebrew => commands.push(export_in_zshrc("HOMEBREW_CACHE", &vm_cache_dir)),
            CacheType::Npm => commands.push(format!("npm config set cache {}", vm_cache_dir)),
            CacheType::Go => {
                commands.push(export_in_zshrc("GOMODCACHE", &format!("{}/pkg/mod", vm_cache_dir)))
            }
            CacheType::Git => {}
        }
        commands
    }

    // ── Git cache ────────────────────────────────────────────────────

    /// Names of the repositories mirrored in the git cache, sorted.
    pub fn list_cached_repos(&self) -> Result<Vec<String>> {
        let git_dir = self.cache_path(CacheType::Git);
        let entries = match fs::read_dir(&git_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context("Failed to read git cache directory"),
        };

        let mut repos = Vec::new();
        for entry in entries {
            let entry = entry.context("Failed to read git cache entry")?;
            if entry.path().is_dir() {
                repos.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        repos.sort();
        Ok(repos)
    }

    /// Clone `url` into the git cache as `name`. Returns `false` without
    /// touching the network when the repository is already cached.
    pub fn cache_repo(&self, url: &str, name: &str) -> Result<bool> {
        if self.home_dir.is_none() {
            return Err(IsolationError::HomeUnavailable.into());
        }
        validate_repo_name(name)?;

        let git_dir = self.cache_path(CacheType::Git);
        let repo_dir = git_dir.join(name);
        if fs::symlink_metadata(&repo_dir).is_ok() {
            debug!(repo = name, "cache:repo already cached");
            return Ok(false);
        }

        fs::create_dir_all(&git_dir).context("Failed to create git cache directory")?;

        let target = repo_dir.to_string_lossy();
        Cmd::new("git")
            .args(["clone", url, target.as_ref()])
            .run()
            .with_context(|| format!("Failed to clone repo {}", url))?;

        info!(repo = name, url, "cache:repo cloned");
        Ok(true)
    }

    /// Fetch every remote of every cached repository. A repository that fails
    /// to fetch is logged and skipped; the return value counts successes.
    pub fn update_repos(&self) -> Result<usize> {
        let repos = self
            .list_cached_repos()
            .context("Failed to get cached repos")?;

        let git_dir = self.cache_path(CacheType::Git);
        let mut updated = 0;
        for repo in &repos {
            let repo_path = git_dir.join(repo);
            match Cmd::new("git")
                .args(["fetch", "--all"])
                .workdir(&repo_path)
                .run()
            {
                Ok(_) => updated += 1,
                Err(e) => {
                    warn!(repo = %repo, error = %e, "failed to update git cache");
                    eprintln!("Warning: failed to update git cache for {}: {}", repo, e);
                }
            }
        }

        info!(updated, total = repos.len(), "cache:repos updated");
        Ok(updated)
    }

    /// Render a human-readable report of every cache.
    pub fn status<W: Write>(&self, w: &mut W) -> Result<()> {
        writeln!(w, "Cache Status:")?;
        writeln!(w)?;

        for cache_type in CacheType::ALL {
            let entry = self
                .info(cache_type)
                .with_context(|| format!("Failed to get {} cache info", cache_type.label()))?;

            writeln!(w, "{}:", cache_type.label())?;
            writeln!(w, "  Location: {}", entry.host_path.display())?;
            if entry.available {
                writeln!(w, "  Status: ✓ Ready")?;
                writeln!(w, "  Size: {}", format_bytes(entry.size_bytes))?;
                if let Some(accessed) = entry.last_access {
                    writeln!(w, "  Last access: {}", format_timestamp(accessed))?;
                }
                if cache_type == CacheType::Git {
                    let repos = self.list_cached_repos().unwrap_or_default();
                    if !repos.is_empty() {
                        writeln!(w, "  Cached repos: {}", repos.len())?;
                        for repo in &repos {
                            writeln!(w, "    - {}", repo)?;
                        }
                    }
                }
            } else {
                writeln!(w, "  Status: ✗ Not configured")?;
            }
            writeln!(w)?;
        }

        Ok(())
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Format bytes using base-1024 units with one decimal place.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["KB", "MB", "GB", "TB", "PB", "EB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut size = bytes as f64 / 1024.0;
    let mut unit_idx = 0;
    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.1} {}", size, UNITS[unit_idx])
}

fn format_timestamp(time: SystemTime) -> String {
    DateTime::<Local>::from(time).to_rfc3339_opts(SecondsFormat::Secs, false)
}

fn export_in_zshrc(var: &str, value: &str) -> String {
    format!(
        "touch ~/.zshrc && grep -q '{var}' ~/.zshrc || echo 'export {var}={value}' >> ~/.zshrc"
    )
}

fn validate_repo_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
    {
        bail!("invalid repository name: '{}'", name);
    }
    Ok(())
}

/// Target of `path` when it is a symlink whose target exists.
fn symlink_target(path: &Path) -> Result<Option<PathBuf>> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to stat {}", path.display())),
    };
    if !metadata.file_type().is_symlink() {
        return Ok(None);
    }

    let link = fs::read_link(path)
        .with_context(|| format!("Failed to read symlink {}", path.display()))?;
    let target = if link.is_absolute() {
        link
    } else {
        path.parent().map(|p| p.join(&link)).unwrap_or(link)
    };

    if target.exists() {
        Ok(Some(target))
    } else {
        Ok(None)
    }
}

/// Sum of regular file lengths below `root`, not following nested symlinks.
/// A symlinked `root` is only entered when `follow_root` is set.
fn apparent_size(root: &Path, follow_root: bool) -> u64 {
    WalkDir::new(root)
        .follow_links(false)
        .follow_root_links(follow_root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Remove every entry inside `dir`, leaving `dir` itself in place.
fn clear_contents(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            remove_all_with_perm_fix(&path)?;
        } else {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
    }
    Ok(())
}

/// Remove a directory tree. On a permission failure, make every entry
/// owner-writable and retry once.
fn remove_all_with_perm_fix(path: &Path) -> Result<()> {
    let err = match fs::remove_dir_all(path) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    if err.kind() != io::ErrorKind::PermissionDenied {
        return Err(err).with_context(|| format!("Failed to remove {}", path.display()));
    }

    debug!(path = %path.display(), "cache:remove retrying after permission fix");
    for entry in WalkDir::new(path).follow_links(false).into_iter().flatten() {
        if entry.path_is_symlink() {
            continue;
        }
        if let Ok(metadata) = entry.metadata() {
            let _ = fs::set_permissions(entry.path(), owner_writable(metadata.permissions()));
        }
    }

    fs::remove_dir_all(path).with_context(|| format!("Failed to remove {}", path.display()))
}

#[cfg(unix)]
fn owner_writable(perms: fs::Permissions) -> fs::Permissions {
    use std::os::unix::fs::PermissionsExt;
    fs::Permissions::from_mode(perms.mode() | 0o200)
}

#[cfg(not(unix))]
fn owner_writable(mut perms: fs::Permissions) -> fs::Permissions {
    perms.set_readonly(false);
    perms
}
