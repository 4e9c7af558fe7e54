//! The command tree: a nested namespace of named entries, each either a
//! runnable leaf or a sub-table the operator can "enter" as a context.
//!
//! Registration happens once, before the REPL starts; after that the tree
//! is read-only from the parser's point of view. A line is tokenized into
//! at most 32 words and walked against the tree starting from whatever
//! context is currently in force.

const MAX_TOKENS: usize = 32;

/// What a registered leaf returns for the REPL to print.
pub type Handler = Box<dyn Fn(&[String]) -> String + Send + Sync>;

enum Kind {
    Leaf(Handler),
    Table(CommandTable),
}

struct Entry {
    name: String,
    help: String,
    kind: Kind,
}

/// A namespace of commands and sub-namespaces.
#[derive(Default)]
pub struct CommandTable {
    entries: Vec<Entry>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a runnable command at `ctx` (the path of sub-contexts
    /// leading to it, empty for the root), creating any intermediate table
    /// nodes named along the way that don't already exist.
    pub fn register(
        &mut self,
        ctx: &[&str],
        name: &str,
        help: &str,
        run: impl Fn(&[String]) -> String + Send + Sync + 'static,
    ) {
        let table = self.table_at_mut(ctx);
        table.entries.push(Entry {
            name: name.to_string(),
            help: help.to_string(),
            kind: Kind::Leaf(Box::new(run)),
        });
    }

    /// Declare a sub-context at `ctx`/`name` so commands can be registered
    /// underneath it, and so it carries its own help text even if it ends
    /// up empty.
    pub fn register_context(&mut self, ctx: &[&str], name: &str, help: &str) {
        let table = self.table_at_mut(ctx);
        if let Some(existing) = table.entries.iter_mut().find(|e| e.name == name) {
            existing.help = help.to_string();
            return;
        }
        table.entries.push(Entry {
            name: name.to_string(),
            help: help.to_string(),
            kind: Kind::Table(CommandTable::new()),
        });
    }

    fn table_at_mut(&mut self, ctx: &[&str]) -> &mut CommandTable {
        let mut cur = self;
        for seg in ctx {
            let idx = match cur.entries.iter().position(|e| e.name == *seg) {
                Some(i) => i,
                None => {
                    cur.entries.push(Entry {
                        name: seg.to_string(),
                        help: String::new(),
                        kind: Kind::Table(CommandTable::new()),
                    });
                    cur.entries.len() - 1
                }
            };
            cur = match &mut cur.entries[idx].kind {
                Kind::Table(t) => t,
                Kind::Leaf(_) => panic!("'{seg}' is registered as a leaf command, not a context"),
            };
        }
        cur
    }

    /// The sub-table reached by following `path` from this table, or
    /// `None` if any segment doesn't name a context.
    pub fn table_at(&self, path: &[String]) -> Option<&CommandTable> {
        let mut cur = self;
        for seg in path {
            cur = match cur.entries.iter().find(|e| &e.name == seg) {
                Some(Entry { kind: Kind::Table(t), .. }) => t,
                _ => return None,
            };
        }
        Some(cur)
    }

    /// Names and help text of this table's direct children, in
    /// registration order.
    pub fn listing(&self) -> Vec<(&str, &str)> {
        self.entries.iter().map(|e| (e.name.as_str(), e.help.as_str())).collect()
    }
}

/// The result of walking one line of input against the command tree.
pub enum Outcome {
    /// A leaf matched; `output` is the text the handler returned.
    Runnable { output: String },
    /// Every token matched a table node; `path` is the full context path
    /// now in force from the root.
    Partial { path: Vec<String> },
    /// A token matched nothing in its table.
    ParseError(String),
}

/// Split a line into at most [`MAX_TOKENS`] whitespace-separated tokens.
/// Trailing tokens beyond the cap are silently dropped, matching a fixed
/// argv slot count.
pub fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace().take(MAX_TOKENS).map(str::to_string).collect()
}

/// Walk `tokens` against `root`, starting from the table reached by
/// `current_path`. Returns `None` if `current_path` itself is stale
/// (should not happen in normal operation).
pub fn parse(root: &CommandTable, current_path: &[String], tokens: &[String]) -> Option<Outcome> {
    let mut table = root.table_at(current_path)?;
    let mut path = current_path.to_vec();

    for (i, tok) in tokens.iter().enumerate() {
        match table.entries.iter().find(|e| &e.name == tok) {
            Some(Entry { kind: Kind::Table(t), name, .. }) => {
                table = t;
                path.push(name.clone());
            }
            Some(Entry { kind: Kind::Leaf(run), .. }) => {
                let output = run(&tokens[i + 1..]);
                return Some(Outcome::Runnable { output });
            }
            None => return Some(Outcome::ParseError(format!("unknown command '{tok}'"))),
        }
    }

    Some(Outcome::Partial { path })
}
