//! `code_base` collection: read-only file tools over one indexed directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::core::errors::MalformedResponse;
use crate::core::property::PropertyDefinition;
use crate::core::response::ToolResponse;
use crate::tools::code::index::{
    CodeIndex, MAX_READ_FILE_SIZE, MAX_SEARCH_FILE_SIZE, parent_of, sanitize_output,
    sanitize_path,
};
use crate::tools::{Tool, ToolArgs, ToolContext, ToolError, str_arg};

pub const NO_RESULTS: &str = "(no results found)";
pub const NO_FILES: &str = "(no files found)";
pub const FILE_NOT_FOUND: &str = "(file not found)";
pub const FILE_TOO_LARGE: &str = "(file too large)";

/// Extensions considered text for content search.
const SEARCHABLE_EXTENSIONS: &[&str] = &[
    "rs", "toml", "php", "txt", "py", "go", "yaml", "yml", "md", "twig", "html", "htm", "css",
    "scss", "sass", "dist", "json", "js", "ts", "jsx", "tsx", "lua", "xml", "sql", "sh",
    "dockerfile",
];
/// Extensionless file names searched anyway.
const SEARCHABLE_NAMES: &[&str] = &["dockerfile"];

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct CodeBaseConfig {
    root: PathBuf,
}

/// Factory for the `code_base` collection. Config: `{ "root": "<dir>" }`.
pub fn code_base_tools(config: &Value) -> Result<Vec<Box<dyn Tool>>> {
    let config: CodeBaseConfig =
        serde_json::from_value(config.clone()).context("parse code_base tool config")?;
    let root = config.root;
    Ok(vec![
        Box::new(ListDir { root: root.clone() }),
        Box::new(FindFile { root: root.clone() }),
        Box::new(FindString { root: root.clone() }),
        Box::new(ReadFile { root }),
    ])
}

/// Index for `root`, built on first use within a run.
fn index<'c>(ctx: &'c mut ToolContext<'_>, root: &Path) -> Result<&'c CodeIndex> {
    let key = format!("code_base:{}", root.display());
    let index = ctx
        .cache()
        .get_or_try_insert_with(&key, || CodeIndex::build(root))?;
    Ok(index)
}

fn message(output: String, empty: &str) -> ToolResponse {
    if output.trim().is_empty() {
        ToolResponse::message(empty)
    } else {
        ToolResponse::message(sanitize_output(&output))
    }
}

struct ListDir {
    root: PathBuf,
}

impl Tool for ListDir {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> String {
        "List all files and directories in a given directory.".to_string()
    }

    fn properties(&self) -> Vec<PropertyDefinition> {
        vec![
            PropertyDefinition::string("path")
                .with_description("The path of the folder to list (default: project root directory)."),
        ]
    }

    fn execute(&self, args: &ToolArgs, ctx: &mut ToolContext<'_>) -> Result<ToolResponse, ToolError> {
        let dir = sanitize_path(str_arg(args, "path").unwrap_or("/"));
        let index = index(ctx, &self.root)?;
        let mut output = String::new();
        for path in index.dirs().iter().filter(|p| parent_of(p) == dir) {
            output.push_str(&format!("DIR\t{path}\n"));
        }
        for file in index.files().iter().filter(|f| parent_of(&f.path) == dir) {
            output.push_str(&format!("FILE\t{}\n", file.path));
        }
        Ok(message(output, NO_RESULTS))
    }
}

struct FindFile {
    root: PathBuf,
}

impl Tool for FindFile {
    fn name(&self) -> &str {
        "find_file"
    }

    fn description(&self) -> String {
        "Search recursively from the code base root directory for a file.".to_string()
    }

    fn properties(&self) -> Vec<PropertyDefinition> {
        vec![
            PropertyDefinition::string("name")
                .with_description("Name of file to search for, wildcards are supported.")
                .required(),
        ]
    }

    fn execute(&self, args: &ToolArgs, ctx: &mut ToolContext<'_>) -> Result<ToolResponse, ToolError> {
        let name = str_arg(args, "name").unwrap_or_default().trim_start_matches('/');
        let pattern = wildcard_regex(&format!("*/{name}")).context("compile file pattern")?;
        let index = index(ctx, &self.root)?;
        let matched: Vec<&str> = index
            .files()
            .iter()
            .map(|f| f.path.as_str())
            .filter(|path| pattern.is_match(path))
            .collect();
        Ok(message(matched.join("\n"), NO_FILES))
    }
}

/// Shell-style `*`/`?` wildcard matched against the whole path.
fn wildcard_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(pattern)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    Regex::new(&format!("^{escaped}$"))
}

struct FindString {
    root: PathBuf,
}

impl Tool for FindString {
    fn name(&self) -> &str {
        "find_string"
    }

    fn description(&self) -> String {
        "Search the entire code base for files containing a string.".to_string()
    }

    fn properties(&self) -> Vec<PropertyDefinition> {
        vec![
            PropertyDefinition::string("search")
                .with_description("The string to search for.")
                .required(),
        ]
    }

    fn execute(&self, args: &ToolArgs, ctx: &mut ToolContext<'_>) -> Result<ToolResponse, ToolError> {
        let search = str_arg(args, "search").unwrap_or_default();
        if search.is_empty() {
            return Err(MalformedResponse::PropertyInvalid {
                tool: self.name().to_string(),
                property: "search".to_string(),
                why: "The search string must not be empty.".to_string(),
            }
            .into());
        }
        let index = index(ctx, &self.root)?;
        let mut output = String::new();
        for file in index.files() {
            if file.size > MAX_SEARCH_FILE_SIZE || !is_searchable(&file.path) {
                continue;
            }
            let bytes = match index.read(file) {
                Ok(bytes) => bytes,
                Err(err) => {
                    debug!(path = %file.path, error = %err, "skipping unreadable file");
                    continue;
                }
            };
            let Ok(contents) = String::from_utf8(bytes) else {
                continue;
            };
            for (number, line) in contents.lines().enumerate() {
                if line.contains(search) {
                    output.push_str(&format!("{} (line {})\n", file.path, number + 1));
                }
            }
        }
        Ok(message(output, NO_RESULTS))
    }
}

fn is_searchable(path: &str) -> bool {
    let path = Path::new(path);
    let listed = |part: Option<&std::ffi::OsStr>, list: &[&str]| {
        part.and_then(|part| part.to_str())
            .is_some_and(|part| list.contains(&part.to_ascii_lowercase().as_str()))
    };
    listed(path.extension(), SEARCHABLE_EXTENSIONS) || listed(path.file_name(), SEARCHABLE_NAMES)
}

struct ReadFile {
    root: PathBuf,
}

impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> String {
        "Read the contents of a file.".to_string()
    }

    fn properties(&self) -> Vec<PropertyDefinition> {
        vec![
            PropertyDefinition::string("path")
                .with_description("The path of the file to read.")
                .required(),
        ]
    }

    fn execute(&self, args: &ToolArgs, ctx: &mut ToolContext<'_>) -> Result<ToolResponse, ToolError> {
        let path = sanitize_path(str_arg(args, "path").unwrap_or_default());
        let index = index(ctx, &self.root)?;
        let Some(file) = index.file(&path) else {
            return Ok(ToolResponse::message(FILE_NOT_FOUND));
        };
        if file.size > MAX_READ_FILE_SIZE {
            return Ok(ToolResponse::message(FILE_TOO_LARGE));
        }
        let bytes = match index.read(file) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(path = %file.path, error = %err, "indexed file is no longer readable");
                return Ok(ToolResponse::message(FILE_NOT_FOUND));
            }
        };
        match String::from_utf8(bytes) {
            Ok(contents) => Ok(ToolResponse::message(sanitize_output(&contents))),
            Err(_) => Ok(ToolResponse::message("(binary file)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use super::*;
    use crate::core::prompt::DEFAULT_MODEL;
    use crate::tools::ResourceCache;
    use crate::test_support::TestCodeBase;

    fn run(tool: &str, base: &TestCodeBase, args: Value, cache: &mut ResourceCache) -> String {
        let tools = code_base_tools(&json!({"root": base.path()})).expect("tools");
        let tool = tools
            .iter()
            .find(|t| t.name() == tool)
            .expect("tool exists");
        let Value::Object(args) = args else {
            panic!("args must be an object");
        };
        let mut ctx = ToolContext::new(cache, DEFAULT_MODEL);
        match tool.execute(&args, &mut ctx).expect("execute") {
            ToolResponse::Message { text, .. } => text,
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn list_dir_shows_direct_children() {
        let base = TestCodeBase::new().expect("code base");
        let mut cache = ResourceCache::new();
        assert_eq!(
            run("list_dir", &base, json!({}), &mut cache),
            "DIR\t/src\nFILE\t/Cargo.toml\nFILE\t/README.md"
        );
        assert_eq!(
            run("list_dir", &base, json!({"path": "src/../src"}), &mut cache),
            "DIR\t/src/util\nFILE\t/src/main.rs"
        );
        assert_eq!(
            run("list_dir", &base, json!({"path": "/nope"}), &mut cache),
            NO_RESULTS
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn find_file_supports_wildcards() {
        let base = TestCodeBase::new().expect("code base");
        let mut cache = ResourceCache::new();
        assert_eq!(
            run("find_file", &base, json!({"name": "*.rs"}), &mut cache),
            "/src/main.rs\n/src/util/strings.rs"
        );
        assert_eq!(
            run("find_file", &base, json!({"name": "README.md"}), &mut cache),
            "/README.md"
        );
        assert_eq!(
            run("find_file", &base, json!({"name": "*.py"}), &mut cache),
            NO_FILES
        );
    }

    #[test]
    fn find_string_reports_line_numbers() {
        let base = TestCodeBase::new().expect("code base");
        let mut cache = ResourceCache::new();
        assert_eq!(
            run("find_string", &base, json!({"search": "greet"}), &mut cache),
            "/src/main.rs (line 2)\n/src/util/strings.rs (line 1)"
        );
        assert_eq!(
            run("find_string", &base, json!({"search": "absent"}), &mut cache),
            NO_RESULTS
        );
    }

    #[test]
    fn read_file_stays_inside_root() {
        let base = TestCodeBase::new().expect("code base");
        let mut cache = ResourceCache::new();
        assert_eq!(
            run("read_file", &base, json!({"path": "../README.md"}), &mut cache),
            "# Demo"
        );
        assert_eq!(
            run("read_file", &base, json!({"path": "/etc/passwd"}), &mut cache),
            FILE_NOT_FOUND
        );
    }

    #[test]
    fn files_removed_after_indexing_are_skipped() {
        let base = TestCodeBase::new().expect("code base");
        let mut cache = ResourceCache::new();
        run("list_dir", &base, json!({}), &mut cache);
        fs::remove_file(base.path().join("README.md")).expect("remove readme");
        fs::remove_file(base.path().join("Cargo.toml")).expect("remove manifest");

        assert_eq!(
            run("find_string", &base, json!({"search": "greet"}), &mut cache),
            "/src/main.rs (line 2)\n/src/util/strings.rs (line 1)"
        );
        assert_eq!(
            run("read_file", &base, json!({"path": "/README.md"}), &mut cache),
            FILE_NOT_FOUND
        );
    }

    #[test]
    fn oversized_files_are_not_read() {
        let base = TestCodeBase::new().expect("code base");
        let size = usize::try_from(MAX_READ_FILE_SIZE).expect("fits") + 1;
        fs::write(base.path().join("dump.txt"), vec![b'a'; size]).expect("write dump");
        let mut cache = ResourceCache::new();
        assert_eq!(
            run("read_file", &base, json!({"path": "dump.txt"}), &mut cache),
            FILE_TOO_LARGE
        );
    }

    #[test]
    fn searchable_files_match_whole_extensions() {
        assert!(is_searchable("/src/main.rs"));
        assert!(is_searchable("/README.MD"));
        assert!(is_searchable("/Dockerfile"));
        assert!(is_searchable("/deploy/app.dockerfile"));
        assert!(!is_searchable("/scripts/publish"));
        assert!(!is_searchable("/docs/users"));
        assert!(!is_searchable("/assets/fonts"));
        assert!(!is_searchable("/img/logo.png"));
    }

    #[test]
    fn config_requires_root() {
        let err = code_base_tools(&json!({})).err().expect("missing root");
        assert!(format!("{err:#}").contains("root"));
    }
}
