//! Recipes and the process-spawning action runner

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use kiln_engine::{ActionRef, ActionRunner, Outcome};

use crate::config::Manifest;

/// How a recipe is invoked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeKind {
    /// Program and arguments, run without a shell
    Command(Vec<String>),
    /// Command line passed to the configured shell
    Shell(String),
}

/// A runnable recipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub kind: RecipeKind,
    /// Working directory the recipe runs in
    pub cwd: PathBuf,
    /// Interpreter for shell recipes
    pub shell: String,
}

impl Recipe {
    /// Arguments as a compiler would see them. Shell lines are split into
    /// POSIX shell words; unbalanced quoting yields no arguments.
    pub fn arguments(&self) -> Vec<String> {
        match &self.kind {
            RecipeKind::Command(argv) => argv.clone(),
            RecipeKind::Shell(line) => shlex::split(line).unwrap_or_default(),
        }
    }

    /// Process to spawn, `None` for an empty argument vector
    fn to_command(&self) -> Option<Command> {
        let mut cmd = match &self.kind {
            RecipeKind::Command(argv) => {
                let (program, args) = argv.split_first()?;
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
            RecipeKind::Shell(line) => {
                let mut cmd = Command::new(&self.shell);
                cmd.arg("-c").arg(line);
                cmd
            }
        };
        cmd.current_dir(&self.cwd);
        Some(cmd)
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RecipeKind::Shell(line) => f.write_str(line),
            // Quoted so the echoed line can be pasted back into a shell;
            // only NUL bytes cannot be quoted
            RecipeKind::Command(argv) => match shlex::try_join(argv.iter().map(String::as_str)) {
                Ok(line) => f.write_str(&line),
                Err(_) => f.write_str(&argv.join(" ")),
            },
        }
    }
}

/// Recipes keyed by target name, in declaration order
#[derive(Debug, Clone, Default)]
pub struct RecipeBook {
    order: Vec<String>,
    recipes: HashMap<String, Recipe>,
}

impl RecipeBook {
    /// Collect the recipes of every target that has one
    pub fn from_manifest(manifest: &Manifest, base_dir: &Path) -> Self {
        let mut book = Self::default();
        for target in &manifest.targets {
            let kind = match (&target.command, &target.shell) {
                (Some(argv), _) if !argv.is_empty() => RecipeKind::Command(argv.clone()),
                (_, Some(line)) => RecipeKind::Shell(line.clone()),
                _ => continue,
            };
            let cwd = match &target.cwd {
                Some(dir) => base_dir.join(dir),
                None => base_dir.to_path_buf(),
            };
            book.insert(
                target.name.clone(),
                Recipe {
                    kind,
                    cwd,
                    shell: manifest.settings.shell.clone(),
                },
            );
        }
        book
    }

    /// Register a recipe; a later registration replaces an earlier one
    pub fn insert(&mut self, key: impl Into<String>, recipe: Recipe) {
        let key = key.into();
        if self.recipes.insert(key.clone(), recipe).is_none() {
            self.order.push(key);
        }
    }

    /// Look up a recipe
    pub fn get(&self, key: &str) -> Option<&Recipe> {
        self.recipes.get(key)
    }

    /// Recipes in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Recipe)> {
        self.order
            .iter()
            .filter_map(|key| self.recipes.get(key).map(|r| (key.as_str(), r)))
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

/// Runs recipes as child processes
#[derive(Debug)]
pub struct RecipeRunner {
    book: RecipeBook,
    silent: bool,
}

impl RecipeRunner {
    pub fn new(book: RecipeBook) -> Self {
        Self {
            book,
            silent: false,
        }
    }

    /// Capture recipe output instead of inheriting the terminal
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }
}

impl ActionRunner for RecipeRunner {
    fn run_action(&self, action: &ActionRef) -> Outcome {
        let Some(recipe) = self.book.get(action.as_str()) else {
            return Outcome::Failure(format!("no recipe registered for '{}'", action));
        };
        debug!(action = %action, recipe = %recipe, cwd = %recipe.cwd.display(), "running recipe");

        let Some(mut cmd) = recipe.to_command() else {
            return Outcome::Failure(format!("recipe for '{}' has an empty command", action));
        };
        let result = if self.silent {
            cmd.stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .map(|output| (output.status, String::from_utf8_lossy(&output.stderr).to_string()))
        } else {
            cmd.status().map(|status| (status, String::new()))
        };

        match result {
            Ok((status, _)) if status.success() => Outcome::Success,
            Ok((status, stderr)) => {
                let mut message = match status.code() {
                    Some(code) => format!("command exited with code {}", code),
                    None => "command terminated by signal".to_string(),
                };
                let stderr = stderr.trim();
                if !stderr.is_empty() {
                    message.push_str(": ");
                    message.push_str(stderr);
                }
                Outcome::Failure(message)
            }
            Err(e) => {
                warn!(action = %action, error = %e, "failed to spawn recipe");
                Outcome::Failure(format!("failed to spawn '{}': {}", recipe, e))
            }
        }
    }

    fn describe(&self, action: &ActionRef) -> String {
        match self.book.get(action.as_str()) {
            Some(recipe) => recipe.to_string(),
            None => action.to_string(),
        }
    }
}

/// Records the recipes that would run, without running them
#[derive(Debug)]
pub struct DryRunRunner {
    book: RecipeBook,
    would_run: Mutex<Vec<String>>,
}

impl DryRunRunner {
    pub fn new(book: RecipeBook) -> Self {
        Self {
            book,
            would_run: Mutex::new(Vec::new()),
        }
    }

    /// Command lines in the order they were reached
    pub fn commands(&self) -> Vec<String> {
        self.would_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ActionRunner for DryRunRunner {
    fn run_action(&self, action: &ActionRef) -> Outcome {
        self.would_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(self.describe(action));
        Outcome::Success
    }

    fn describe(&self, action: &ActionRef) -> String {
        match self.book.get(action.as_str()) {
            Some(recipe) => recipe.to_string(),
            None => action.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use kiln_engine::{BuildSession, FsMetadata, NodeState, SessionOptions, TargetId};
    use tempfile::TempDir;

    fn manifest(src: &str) -> Manifest {
        toml::from_str(src).unwrap()
    }

    #[test]
    fn test_recipe_book_from_manifest() {
        let m = manifest(
            r#"
[[target]]
name = "app"
command = ["cc", "-o", "app", "main.c"]
cwd = "build"

[[target]]
name = "main.c"

[[target]]
name = "clean"
phony = true
shell = "rm -rf build"
"#,
        );
        let book = m.recipes(Path::new("/proj"));

        assert_eq!(book.len(), 2);
        let keys: Vec<&str> = book.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["app", "clean"]);

        let app = book.get("app").unwrap();
        assert_eq!(app.cwd, PathBuf::from("/proj/build"));
        assert_eq!(app.to_string(), "cc -o app main.c");
        assert_eq!(book.get("clean").unwrap().cwd, PathBuf::from("/proj"));
    }

    fn recipe(kind: RecipeKind) -> Recipe {
        Recipe {
            kind,
            cwd: PathBuf::from("."),
            shell: "sh".into(),
        }
    }

    #[test]
    fn test_recipe_display_quotes_arguments() {
        let argv: Vec<String> = ["echo", "hello world", "it's", "a;b", "$HOME", ""]
            .into_iter()
            .map(String::from)
            .collect();
        let line = recipe(RecipeKind::Command(argv.clone())).to_string();

        assert!(line.starts_with("echo "));
        assert!(!line.contains(" a;b"));
        assert!(!line.contains(" $HOME"));
        assert_eq!(shlex::split(&line).unwrap(), argv);
    }

    #[test]
    fn test_plain_arguments_stay_unquoted() {
        let argv = vec!["cc".into(), "-o".into(), "build/app".into(), "main.c".into()];
        assert_eq!(
            recipe(RecipeKind::Command(argv)).to_string(),
            "cc -o build/app main.c"
        );
    }

    #[test]
    fn test_shell_arguments_follow_quoting() {
        let quoted = recipe(RecipeKind::Shell("cc -DMSG='hello world'  -c main.c".into()));
        assert_eq!(
            quoted.arguments(),
            vec!["cc", "-DMSG=hello world", "-c", "main.c"]
        );

        let unbalanced = recipe(RecipeKind::Shell("cc \"main.c".into()));
        assert!(unbalanced.arguments().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_runner_success_and_failure() {
        let temp = TempDir::new().unwrap();
        let m = manifest(
            r#"
[[target]]
name = "ok"
shell = "touch ok"

[[target]]
name = "bad"
shell = "echo broken >&2; exit 3"
"#,
        );
        let runner = RecipeRunner::new(m.recipes(temp.path())).silent(true);

        assert_eq!(runner.run_action(&ActionRef::new("ok")), Outcome::Success);
        assert!(temp.path().join("ok").exists());

        assert_eq!(
            runner.run_action(&ActionRef::new("bad")),
            Outcome::Failure("command exited with code 3: broken".to_string())
        );
        assert!(matches!(
            runner.run_action(&ActionRef::new("missing")),
            Outcome::Failure(msg) if msg.contains("no recipe")
        ));
    }

    #[test]
    fn test_runner_spawn_failure() {
        let temp = TempDir::new().unwrap();
        let m = manifest("[[target]]\nname = \"x\"\ncommand = [\"kiln-no-such-program\"]\n");
        let runner = RecipeRunner::new(m.recipes(temp.path())).silent(true);

        assert!(matches!(
            runner.run_action(&ActionRef::new("x")),
            Outcome::Failure(msg) if msg.starts_with("failed to spawn 'kiln-no-such-program'")
        ));
    }

    #[test]
    fn test_dry_run_runner() {
        let m = manifest("[[target]]\nname = \"app\"\ncommand = [\"cc\", \"main.c\"]\n");
        let runner = DryRunRunner::new(m.recipes(Path::new(".")));

        assert_eq!(runner.run_action(&ActionRef::new("app")), Outcome::Success);
        assert_eq!(runner.commands(), vec!["cc main.c"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_incremental_build_on_disk() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("input.txt"), "data").unwrap();
        let m = manifest(
            r#"
[[target]]
name = "output.txt"
deps = ["input.txt"]
shell = "cp input.txt output.txt"

[[target]]
name = "input.txt"
"#,
        );
        let graph = m.graph().unwrap();
        let targets = vec![TargetId::from("output.txt")];
        let runner = Arc::new(RecipeRunner::new(m.recipes(temp.path())).silent(true));
        let session = BuildSession::new(runner, Arc::new(FsMetadata::new(temp.path())));

        let first = session
            .run(&graph, &targets, &SessionOptions::default())
            .await
            .unwrap();
        assert!(first.is_success());
        assert!(first.was_rebuilt("output.txt"));
        assert_eq!(
            std::fs::read_to_string(temp.path().join("output.txt")).unwrap(),
            "data"
        );

        let second = session
            .run(&graph, &targets, &SessionOptions::default())
            .await
            .unwrap();
        assert!(second.rebuilt.is_empty());
        assert_eq!(second.state_of("output.txt"), Some(NodeState::Succeeded));
    }
}
