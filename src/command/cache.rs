//! `calf cache` commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use console::style;
use git_url_parse::GitUrl;
use git_url_parse::types::provider::GenericProvider;
use std::io::{self, Write};

use crate::isolation::{CacheManager, CacheType, format_bytes};
use crate::prompt::{self, Confirm, StdinConfirm};
use crate::spinner;

#[derive(Debug, Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Show cache status and sizes
    Status,
    /// Create the cache directories on the host
    Setup,
    /// Clear package download caches, prompting for each cache type
    Clear {
        /// Clear all caches without prompting (dangerous)
        #[arg(short, long)]
        all: bool,
        /// Show what would be cleared without actually clearing
        #[arg(long)]
        dry_run: bool,
        /// Only consider these cache types (homebrew, npm, go, git)
        #[arg(long = "type", value_name = "TYPE")]
        types: Vec<CacheType>,
    },
    /// Mirror a git repository into the git cache
    AddRepo {
        /// Repository URL
        url: String,
        /// Directory name in the cache (defaults to the repository name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Fetch all remotes of every cached git repository
    Update,
    /// Print the shell commands that link a VM's caches to the shared mount
    VmScript,
}

pub fn run(args: CacheArgs) -> Result<()> {
    let cm = CacheManager::new();
    match args.command {
        CacheCommand::Status => cm.status(&mut io::stdout()),
        CacheCommand::Setup => run_setup(&cm),
        CacheCommand::Clear {
            all,
            dry_run,
            types,
        } => {
            let options = ClearOptions {
                all,
                dry_run,
                types,
            };
            run_clear(&cm, &options, &mut StdinConfirm, &mut io::stdout()).map(|_| ())
        }
        CacheCommand::AddRepo { url, name } => run_add_repo(&cm, &url, name),
        CacheCommand::Update => run_update(&cm),
        CacheCommand::VmScript => {
            for cache_type in CacheType::ALL {
                for command in cm.vm_setup_commands(cache_type) {
                    println!("{}", command);
                }
            }
            Ok(())
        }
    }
}

fn run_setup(cm: &CacheManager) -> Result<()> {
    cm.setup_all()?;
    println!(
        "{} Caches ready in {}",
        style("✓").green(),
        cm.cache_base_dir().display()
    );
    Ok(())
}

pub struct ClearOptions {
    pub all: bool,
    pub dry_run: bool,
    /// Empty means every cache type.
    pub types: Vec<CacheType>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ClearSummary {
    pub available: usize,
    pub cleared: usize,
    pub freed_bytes: u64,
}

/// Walk the available caches, confirm each one (unless `all`), and clear.
/// Per-cache failures are reported and skipped.
pub fn run_clear<W: Write>(
    cm: &CacheManager,
    options: &ClearOptions,
    confirm: &mut dyn Confirm,
    out: &mut W,
) -> Result<ClearSummary> {
    let mut summary = ClearSummary::default();

    if options.all && !options.dry_run {
        writeln!(out, "Warning: Clearing all caches without confirmation")?;
        writeln!(out, "This will slow down your next VM bootstrap!")?;
        writeln!(out)?;
    }
    if options.dry_run {
        writeln!(out, "Dry run: Showing what would be cleared")?;
        writeln!(out)?;
    }

    let selected: Vec<CacheType> = if options.types.is_empty() {
        CacheType::ALL.to_vec()
    } else {
        options.types.clone()
    };

    for cache_type in selected {
        let label = cache_type.label();
        let info = match cm.info(cache_type) {
            Ok(info) => info,
            Err(e) => {
                eprintln!("Error getting {} cache info: {:#}", label, e);
                continue;
            }
        };
        if !info.available {
            continue;
        }
        summary.available += 1;

        let size = format_bytes(info.size_bytes);
        let should_clear = if options.all {
            if options.dry_run {
                writeln!(out, "Would clear {} cache ({})", label, size)?;
            } else {
                writeln!(out, "Clearing {} cache ({})...", label, size)?;
            }
            true
        } else {
            match confirm.ask(&format!("Clear {} cache ({})? [y/N]: ", label, size))? {
                Some(answer) => prompt::is_explicit_yes(&answer),
                None => {
                    writeln!(out, "Skipping {} cache (EOF)", label)?;
                    writeln!(out)?;
                    continue;
                }
            }
        };

        if !should_clear {
            writeln!(out, "Skipping {} cache", label)?;
            writeln!(out)?;
            continue;
        }

        match cm.clear(cache_type, options.dry_run) {
            Ok(true) => {
                summary.cleared += 1;
                summary.freed_bytes += info.size_bytes;
                if !options.all && !options.dry_run {
                    writeln!(out, "Cleared {} cache", label)?;
                }
            }
            Ok(false) => {}
            Err(e) => eprintln!("Error clearing {} cache: {:#}", label, e),
        }
        writeln!(out)?;
    }

    if summary.available == 0 {
        writeln!(out, "No caches found to clear")?;
        return Ok(summary);
    }
    if summary.cleared == 0 {
        writeln!(out, "No caches cleared")?;
        return Ok(summary);
    }

    let action = if options.dry_run {
        "Would clear"
    } else {
        "Cleared"
    };
    writeln!(
        out,
        "{} {} ({}/{} caches)",
        action,
        format_bytes(summary.freed_bytes),
        summary.cleared,
        summary.available
    )?;

    if !options.dry_run {
        writeln!(out)?;
        writeln!(out, "Warning: Next VM bootstrap will be slower")?;
        writeln!(out, "Use 'calf cache status' to verify caches are empty")?;
    }

    Ok(summary)
}

fn run_add_repo(cm: &CacheManager, url: &str, name: Option<String>) -> Result<()> {
    let name = match name {
        Some(name) => name,
        None => repo_name_from_url(url)
            .with_context(|| format!("Could not derive a repository name from {}", url))?,
    };

    let cloned = spinner::with_spinner(&format!("Caching {}", name), || {
        cm.cache_repo(url, &name)
    })?;
    if cloned {
        println!("Cached {} as {}", url, style(&name).bold());
    } else {
        println!("{} is already cached", style(&name).bold());
    }
    Ok(())
}

fn run_update(cm: &CacheManager) -> Result<()> {
    let total = cm.list_cached_repos()?.len();
    if total == 0 {
        println!("No cached git repositories");
        return Ok(());
    }

    let updated = spinner::with_spinner("Updating cached git repositories", || cm.update_repos())?;
    println!("Updated {}/{} cached repositories", updated, total);
    Ok(())
}

/// Repository name from a git URL or local path, without any `.git` suffix.
fn repo_name_from_url(url: &str) -> Option<String> {
    let is_remote = url.starts_with("git@") || (url.contains("://") && !url.starts_with("file://"));
    if is_remote && let Ok(parsed) = GitUrl::parse(url) {
        let provider: Result<GenericProvider, _> = parsed.provider_info();
        if let Ok(provider) = provider {
            let repo = provider.repo().to_string();
            let repo = repo.trim_end_matches(".git");
            if !repo.is_empty() {
                return Some(repo.to_string());
            }
        }
    }

    let last = url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()?
        .trim_end_matches(".git");
    if last.is_empty() {
        None
    } else {
        Some(last.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::testing::ScriptedConfirm;
    use std::fs;
    use tempfile::TempDir;

    fn manager(tmp: &TempDir) -> CacheManager {
        CacheManager::with_base_dir(Some(tmp.path().to_path_buf()), tmp.path().join("cache"))
    }

    fn options(all: bool, dry_run: bool) -> ClearOptions {
        ClearOptions {
            all,
            dry_run,
            types: Vec::new(),
        }
    }

    #[test]
    fn clear_with_no_caches() {
        let tmp = TempDir::new().unwrap();
        let mut out = Vec::new();
        let summary = run_clear(
            &manager(&tmp),
            &options(false, false),
            &mut ScriptedConfirm::default(),
            &mut out,
        )
        .unwrap();
        assert_eq!(summary, ClearSummary::default());
        assert!(String::from_utf8(out).unwrap().contains("No caches found to clear"));
    }

    #[test]
    fn clear_prompts_per_cache() {
        let tmp = TempDir::new().unwrap();
        let cm = manager(&tmp);
        cm.setup(CacheType::Npm).unwrap();
        cm.setup(CacheType::Go).unwrap();
        fs::write(cm.cache_path(CacheType::Npm).join("pkg.tgz"), vec![0u8; 2048]).unwrap();
        fs::write(cm.cache_path(CacheType::Go).join("keep"), b"keep").unwrap();

        // npm comes before go in display order.
        let mut confirm = ScriptedConfirm::new([Some("y\n"), Some("\n")]);
        let mut out = Vec::new();
        let summary = run_clear(&cm, &options(false, false), &mut confirm, &mut out).unwrap();

        assert_eq!(confirm.prompts[0], "Clear npm cache (2.0 KB)? [y/N]: ");
        assert_eq!(summary.available, 2);
        assert_eq!(summary.cleared, 1);
        assert_eq!(summary.freed_bytes, 2048);
        assert!(!cm.cache_path(CacheType::Npm).join("pkg.tgz").exists());
        assert!(cm.cache_path(CacheType::Go).join("keep").exists());

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Skipping Go cache"));
        assert!(text.contains("Cleared 2.0 KB (1/2 caches)"));
    }

    #[test]
    fn clear_skips_on_end_of_input() {
        let tmp = TempDir::new().unwrap();
        let cm = manager(&tmp);
        cm.setup(CacheType::Npm).unwrap();

        let mut out = Vec::new();
        let summary = run_clear(
            &cm,
            &options(false, false),
            &mut ScriptedConfirm::new([None]),
            &mut out,
        )
        .unwrap();
        assert_eq!(summary.cleared, 0);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Skipping npm cache (EOF)"));
        assert!(text.contains("No caches cleared"));
    }

    #[test]
    fn clear_all_dry_run_reports_without_prompting() {
        let tmp = TempDir::new().unwrap();
        let cm = manager(&tmp);
        cm.setup_all().unwrap();
        fs::write(cm.cache_path(CacheType::Homebrew).join("downloads/a"), b"a").unwrap();

        let mut confirm = ScriptedConfirm::default();
        let mut out = Vec::new();
        let summary = run_clear(&cm, &options(true, true), &mut confirm, &mut out).unwrap();

        assert!(confirm.prompts.is_empty());
        assert_eq!(summary.cleared, 4);
        assert!(cm.cache_path(CacheType::Homebrew).join("downloads/a").exists());
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Would clear Homebrew cache"));
        assert!(!text.contains("Next VM bootstrap will be slower"));
    }

    #[test]
    fn clear_respects_type_filter() {
        let tmp = TempDir::new().unwrap();
        let cm = manager(&tmp);
        cm.setup_all().unwrap();

        let options = ClearOptions {
            all: true,
            dry_run: false,
            types: vec![CacheType::Git],
        };
        let summary =
            run_clear(&cm, &options, &mut ScriptedConfirm::default(), &mut Vec::new()).unwrap();
        assert_eq!(summary.available, 1);
        assert_eq!(summary.cleared, 1);
    }

    #[test]
    fn repo_names_from_urls() {
        assert_eq!(
            repo_name_from_url("https://github.com/cirruslabs/tart.git").as_deref(),
            Some("tart")
        );
        assert_eq!(
            repo_name_from_url("git@github.com:owner/project.git").as_deref(),
            Some("project")
        );
        assert_eq!(
            repo_name_from_url("/srv/mirrors/tools/").as_deref(),
            Some("tools")
        );
    }
}
