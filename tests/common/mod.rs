//! Shared fixtures: a scripted build runner and a recording store.

#![allow(dead_code)]

use editor_release::archive::zip_directory;
use editor_release::config::{EnvConfig, TimeoutConfig};
use editor_release::context::{Arch, BuildContext, HostOs, RunRequest};
use editor_release::error::{Result, StoreError};
use editor_release::store::{AccessPolicy, FsStore, Location, ObjectStore};
use editor_release::toolchain::{BuildRunner, Stage, StageInvocation, StageResult};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

pub const BUCKET: &str = "gs://bucket";
pub const LINUX_32: &str = "dart-editor-linux.gtk.x86.zip";
pub const LINUX_64: &str = "dart-editor-linux.gtk.x86_64.zip";

/// Build runner that fakes every tool by writing the files the real tools
/// would produce.
pub struct FakeRunner {
    ctx: BuildContext,
    pub package_status: i32,
    pub test_status: i32,
    pub update_site_status: i32,
    pub sdk_status: i32,
    pub package_archives: Vec<String>,
    pub write_test_html: bool,
    pub runtime_log_dir: Option<PathBuf>,
    pub produce_outputs: bool,
    pub write_properties: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new(ctx: &BuildContext) -> Self {
        Self {
            ctx: ctx.clone(),
            package_status: 0,
            test_status: 0,
            update_site_status: 0,
            sdk_status: 0,
            package_archives: vec![LINUX_32.to_string(), LINUX_64.to_string()],
            write_test_html: false,
            runtime_log_dir: None,
            produce_outputs: true,
            write_properties: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn write_package_archives(&self) {
        let staging = TempDir::new().unwrap();
        let root = staging.path().join("dart");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("DartEditor"), b"editor").unwrap();
        for name in &self.package_archives {
            zip_directory(&root, &self.ctx.out_dir.join(name)).unwrap();
        }
        fs::write(self.ctx.out_dir.join("VERSION"), b"{\"revision\": \"456\"}").unwrap();
    }

    fn properties(&self) -> BTreeMap<String, String> {
        let mut properties = BTreeMap::new();
        if !self.write_properties {
            return properties;
        }
        properties.insert("build.out".to_string(), self.ctx.out_dir.display().to_string());
        if let Some(dir) = &self.runtime_log_dir {
            properties.insert("build.runtime".to_string(), dir.display().to_string());
        }
        properties
    }
}

impl BuildRunner for FakeRunner {
    async fn run_stage(&self, invocation: &StageInvocation) -> Result<StageResult> {
        self.record(format!("stage:{}", invocation.stage));
        // every stage leaves work behind in the build root
        let work = self.ctx.build_root.join("work");
        fs::create_dir_all(&work).unwrap();
        fs::write(work.join(format!("{}.log", invocation.stage)), b"log").unwrap();

        let status = match invocation.stage {
            Stage::UpdateSite => {
                let site = self.ctx.out_dir.join("buildRepo");
                fs::create_dir_all(site.join("plugins")).unwrap();
                fs::write(site.join("index.html"), b"<html/>").unwrap();
                fs::write(site.join("plugins/a.jar"), b"jar").unwrap();
                self.update_site_status
            }
            Stage::Package => {
                if let Some(extras) = invocation.param("build.extra.artifacts") {
                    fs::write(Path::new(extras).join("extra.txt"), b"extra").unwrap();
                }
                if self.package_status == 0 {
                    self.write_package_archives();
                }
                self.package_status
            }
            Stage::Test => {
                if self.write_test_html {
                    let html = self.ctx.out_dir.join("html");
                    fs::create_dir_all(&html).unwrap();
                    fs::write(html.join("index.html"), b"results").unwrap();
                }
                self.test_status
            }
        };
        Ok(StageResult {
            status,
            properties: self.properties(),
        })
    }

    async fn build_sdk_target(&self, archs: &[Arch], target: &str) -> Result<i32> {
        self.record(format!("sdk:{}:{}", target, Arch::join(archs)));
        if self.sdk_status != 0 {
            return Ok(self.sdk_status);
        }
        if !self.produce_outputs {
            return Ok(0);
        }
        let layout = &self.ctx.layout;
        let (os, mode) = (self.ctx.os, self.ctx.mode);
        match target {
            "create_sdk" => {
                for &arch in archs {
                    let tree = layout.sdk_tree(os, mode, arch);
                    fs::create_dir_all(tree.join("bin")).unwrap();
                    fs::create_dir_all(tree.join("lib")).unwrap();
                    fs::write(tree.join("bin/dart"), format!("vm{}", arch.bits())).unwrap();
                    fs::write(tree.join("lib/core.dart"), b"library core;").unwrap();
                }
            }
            "runtime" => {
                for &arch in archs {
                    let dir = layout.sdk_build_dir(os, mode, arch);
                    fs::create_dir_all(&dir).unwrap();
                    fs::write(dir.join("dart"), format!("vm{}", arch.bits())).unwrap();
                }
            }
            "api_docs" => {
                let docs = layout.sdk_build_dir(os, mode, Arch::Ia32).join("api_docs");
                fs::create_dir_all(docs.join("dart_core")).unwrap();
                fs::write(docs.join("index.html"), b"docs").unwrap();
                fs::write(docs.join("dart_core/List.html"), b"List").unwrap();
            }
            other => panic!("unexpected SDK target {other}"),
        }
        Ok(0)
    }
}

/// Filesystem store that records every operation and can be told to fail
/// copies whose destination contains a substring.
pub struct RecordingStore {
    inner: FsStore,
    log: Mutex<Vec<String>>,
    fail_copy_to: Mutex<Option<String>>,
}

impl RecordingStore {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: FsStore::new(root),
            log: Mutex::new(Vec::new()),
            fail_copy_to: Mutex::new(None),
        }
    }

    pub fn fail_copies_to(&self, needle: &str) {
        *self.fail_copy_to.lock().unwrap() = Some(needle.to_string());
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn exists(&self, url: &str) -> bool {
        self.inner.path_for(url).is_file()
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        self.inner.path_for(url)
    }

    /// Position of the first logged operation containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.log().iter().position(|op| op.contains(needle))
    }
}

impl ObjectStore for RecordingStore {
    async fn copy(&self, from: &Location, to: &Location, recursive: bool) -> Result<()> {
        let op = format!("copy {} -> {}", from, to);
        self.log.lock().unwrap().push(op.clone());
        let needle = self.fail_copy_to.lock().unwrap().clone();
        if let Some(needle) = needle
            && to.to_string().contains(&needle)
        {
            return Err(StoreError::CommandFailed {
                command: op,
                status: 1,
                stderr: "AccessDeniedException: 403".to_string(),
            }
            .into());
        }
        self.inner.copy(from, to, recursive).await
    }

    async fn list(&self, pattern: &str) -> Result<Vec<String>> {
        self.log.lock().unwrap().push(format!("list {}", pattern));
        self.inner.list(pattern).await
    }

    async fn remove(&self, pattern: &str, recursive: bool) -> Result<()> {
        self.log.lock().unwrap().push(format!("remove {}", pattern));
        self.inner.remove(pattern, recursive).await
    }

    async fn set_access_policy(&self, object: &str, policy: &AccessPolicy) -> Result<()> {
        self.log.lock().unwrap().push(format!("acl {}", object));
        self.inner.set_access_policy(object, policy).await
    }
}

/// One isolated run: source checkout, output dir, temp dir and store.
pub struct Fixture {
    pub tmp: TempDir,
    pub ctx: BuildContext,
    pub store: RecordingStore,
}

impl Fixture {
    pub fn new(builder: &str, revision: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(tmp.path().join("temp")).unwrap();
        let acl = tmp.path().join("acl.xml");
        fs::write(&acl, b"<AccessControlList/>").unwrap();

        let ctx = BuildContext::resolve(
            RunRequest {
                revision: Some(revision.to_string()),
                name: Some(builder.to_string()),
                out: Some(tmp.path().join("out")),
                dest: Some(BUCKET.to_string()),
                source_root: Some(source.clone()),
                build_root: Some(source.join("build_root")),
                skip_api_docs: true,
                acl_file: Some(acl),
                ..RunRequest::default()
            },
            &EnvConfig {
                username: Some("alice".to_string()),
                ..EnvConfig::default()
            },
            TimeoutConfig::default(),
            HostOs::Linux,
        )
        .unwrap();
        let store = RecordingStore::new(&tmp.path().join("store"));
        Self { tmp, ctx, store }
    }

    /// Directory the pipeline allocates its property file and extras in.
    pub fn temp_dir(&self) -> PathBuf {
        self.tmp.path().join("temp")
    }

    /// Put Linux runtime archives into the runtime store.
    pub fn seed_runtimes(&self) {
        for flavor in ["lucid32", "lucid64"] {
            let chrome = format!("chrome-{flavor}");
            self.seed_runtime(
                &format!("dartium-{flavor}-full-1234.0"),
                &[("chrome", chrome.as_str())],
            );
        }
    }

    /// Put one runtime archive into the runtime store. Its single top-level
    /// folder is named after the archive and holds `files`.
    pub fn seed_runtime(&self, name: &str, files: &[(&str, &str)]) {
        let product = self.tmp.path().join("runtime-staging").join(name);
        for (path, contents) in files {
            let file = product.join(path);
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            fs::write(file, contents).unwrap();
        }
        let url = format!("gs://dartium-archive/latest/{name}.zip");
        zip_directory(&product, &self.store.path_for(&url)).unwrap();
    }

    /// Number of runtime archives copied out of the runtime store.
    pub fn runtime_downloads(&self) -> usize {
        self.store
            .log()
            .iter()
            .filter(|op| op.starts_with("copy gs://dartium-archive/"))
            .count()
    }

    /// Write a package archive holding `dart/DartEditor` into the output
    /// directory.
    pub fn write_package_archive(&self, name: &str) -> PathBuf {
        let staging = self.tmp.path().join("package-staging").join("dart");
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("DartEditor"), b"editor").unwrap();
        let dest = self.ctx.out_dir.join(name);
        zip_directory(&staging, &dest).unwrap();
        dest
    }

    /// Whether the run left nothing behind.
    pub fn assert_cleaned_up(&self) {
        assert!(
            !self.ctx.build_root.exists(),
            "build root {} survived the run",
            self.ctx.build_root.display()
        );
        let leftovers: Vec<_> = fs::read_dir(self.temp_dir())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert!(leftovers.is_empty(), "temp paths survived: {leftovers:?}");
    }
}
