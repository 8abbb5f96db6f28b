//! Interactive navigation over the remote directory tree.

use std::collections::HashMap;
use std::io;

use tracing::{debug, info, warn};

use super::cache::{parse_listing, DirectoryCache, DirectoryNode};
use super::remote_ops::{existence_command, listing_command, mkdir_command, parse_existence};
use crate::error::RemoteShellError;
use crate::execution::RemoteShell;
use crate::remote_path;
use crate::Result;

/// Default listing depth per fetch.
pub const DEFAULT_MAX_DEPTH: usize = 2;

/// What the user picked in a [`DirectoryView`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseAction {
    /// Enter a child (name or path relative to the current directory, or
    /// an absolute path).
    Open(String),
    /// Go to the parent directory.
    Up,
    /// Accept the current directory.
    Select,
    /// Create a subdirectory with this name and stay here.
    Create(String),
    /// Forget the cached listing of the current directory.
    Refresh,
    /// Leave without choosing.
    Cancel,
}

/// One subdirectory as presented to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub path: String,
    pub name: String,
    /// The entry's own children are completely known.
    pub explored: bool,
    /// `None` until the entry has been explored or a child was seen.
    pub has_children: Option<bool>,
}

impl DirectoryEntry {
    /// Whether entering this directory may reveal further subdirectories.
    pub fn expandable(&self) -> bool {
        self.has_children != Some(false)
    }
}

/// The current directory and its known subdirectories, sorted by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryView {
    pub path: String,
    pub entries: Vec<DirectoryEntry>,
}

impl DirectoryView {
    /// Whether this is the filesystem root.
    pub fn is_root(&self) -> bool {
        self.path == "/"
    }

    /// Find an entry by name.
    pub fn entry(&self, name: &str) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }
}

/// User interaction for [`DirectoryBrowser::browse`].
pub trait BrowsePrompt {
    /// Show `view` and return the user's choice.
    fn choose(&mut self, view: &DirectoryView) -> io::Result<BrowseAction>;

    /// Ask whether the missing directory `path` should be created.
    fn confirm_create(&mut self, path: &str) -> io::Result<bool>;

    /// Tell the user something went wrong and browsing continues.
    fn notice(&mut self, message: &str) {
        warn!("{}", message);
    }
}

/// Lazily explores the remote tree over any [`RemoteShell`].
pub struct DirectoryBrowser<'a, S: RemoteShell + ?Sized> {
    shell: &'a S,
    cache: DirectoryCache,
    max_depth: usize,
}

impl<'a, S: RemoteShell + ?Sized> DirectoryBrowser<'a, S> {
    /// Create a browser listing `max_depth` levels per fetch (at least 1).
    pub fn new(shell: &'a S, max_depth: usize) -> Self {
        Self {
            shell,
            cache: DirectoryCache::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Listing depth per fetch.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// The directory cache.
    pub fn cache(&self) -> &DirectoryCache {
        &self.cache
    }

    /// Whether `path` is an existing directory.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        let path = remote_path::normalize(path);
        let result = self.shell.run(&existence_command(&path)).await?;
        parse_existence(&result.stdout).ok_or_else(|| {
            RemoteShellError::process(
                format!("existence check for {}", path),
                format!("unexpected output: {}", result.diagnostic()),
                result.exit_code,
            )
        })
    }

    /// List the tree below `path`, `max_depth` levels deep.
    ///
    /// Does not touch the cache. A missing directory yields an empty map.
    pub async fn fetch_subtree(
        &self,
        path: &str,
        max_depth: usize,
    ) -> Result<HashMap<String, DirectoryNode>> {
        let path = remote_path::normalize(path);
        if !self.exists(&path).await? {
            debug!("{} does not exist", path);
            return Ok(HashMap::new());
        }

        let result = self.shell.run(&listing_command(&path, max_depth)).await?;
        if result.failed() {
            warn!("listing {} exited with {:?}", path, result.exit_code);
        }
        Ok(parse_listing(&path, &result.stdout, max_depth))
    }

    /// Make sure the children of `path` are known, fetching only when the
    /// cache cannot answer. Returns whether a fetch happened.
    pub async fn expand(&mut self, path: &str) -> Result<bool> {
        let path = remote_path::normalize(path);
        if !self.cache.needs_fetch(&path) {
            return Ok(false);
        }

        let fetched = self.fetch_subtree(&path, self.max_depth).await?;
        if fetched.is_empty() {
            self.cache.forget(&path);
            return Err(RemoteShellError::RemoteNotFound { path });
        }
        debug!("fetched {} nodes below {}", fetched.len(), path);
        self.cache.merge(fetched);
        Ok(true)
    }

    /// Create `path` (and missing parents) and record it in the cache
    /// without listing anything. Returns the normalized path.
    pub async fn create_directory(&mut self, path: &str) -> Result<String> {
        let path = remote_path::normalize(path);
        let result = self.shell.run(&mkdir_command(&path)).await?;
        if result.failed() {
            return Err(RemoteShellError::process(
                format!("mkdir {}", path),
                result.diagnostic().to_string(),
                result.exit_code,
            ));
        }
        self.cache.insert_child(&path);
        info!("created remote directory {}", path);
        Ok(path)
    }

    /// Forget the cached children of `path`.
    pub fn refresh(&mut self, path: &str) {
        self.cache.invalidate(path);
    }

    /// Current knowledge about `path` as a view.
    pub fn view(&self, path: &str) -> DirectoryView {
        let path = remote_path::normalize(path);
        let entries = self
            .cache
            .get(&path)
            .map(|node| {
                node.children
                    .iter()
                    .map(|child| self.entry(child))
                    .collect()
            })
            .unwrap_or_default();
        DirectoryView { path, entries }
    }

    fn entry(&self, path: &str) -> DirectoryEntry {
        let node = self.cache.get(path);
        let explored = node.map_or(false, |n| n.fully_explored);
        let has_children = match node {
            Some(n) if !n.children.is_empty() => Some(true),
            Some(n) if n.fully_explored => Some(false),
            _ => None,
        };
        DirectoryEntry {
            path: path.to_string(),
            name: remote_path::file_name(path).to_string(),
            explored,
            has_children,
        }
    }

    /// Walk the tree starting at `start` until the user selects a directory
    /// (`Some`) or cancels (`None`).
    ///
    /// The current directory is checked on every step. A missing one is
    /// offered for creation; declining moves to the parent.
    pub async fn browse<P>(&mut self, start: &str, prompt: &mut P) -> Result<Option<String>>
    where
        P: BrowsePrompt + ?Sized,
    {
        let mut current = remote_path::normalize(start);

        loop {
            if !self.exists(&current).await? {
                self.cache.forget(&current);
                if current == "/" {
                    prompt.notice("the remote root directory is not readable");
                    return Ok(None);
                }
                if prompt.confirm_create(&current)? {
                    if let Err(e) = self.create_directory(&current).await {
                        prompt.notice(&format!("could not create {}: {}", current, e));
                        current = remote_path::parent(&current);
                    }
                } else {
                    current = remote_path::parent(&current);
                }
                continue;
            }

            match self.expand(&current).await {
                Ok(_) => {}
                Err(RemoteShellError::RemoteNotFound { .. }) => continue,
                Err(e) => return Err(e),
            }

            let view = self.view(&current);
            match prompt.choose(&view)? {
                BrowseAction::Open(target) => current = remote_path::join(&current, &target),
                BrowseAction::Up => current = remote_path::parent(&current),
                BrowseAction::Select => {
                    info!("selected remote directory {}", current);
                    return Ok(Some(current));
                }
                BrowseAction::Create(name) => {
                    let target = remote_path::join(&current, &name);
                    if let Err(e) = self.create_directory(&target).await {
                        prompt.notice(&format!("could not create {}: {}", target, e));
                    }
                }
                BrowseAction::Refresh => self.refresh(&current),
                BrowseAction::Cancel => return Ok(None),
            }
        }
    }
}
