//! In-memory fakes for host interaction (testing only)
//!
//! `ScriptedRunner` satisfies the [`CommandRunner`] contract from a table of
//! canned responses, so pipeline behaviour can be exercised without a real
//! toolchain, network or Windows registry.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::exec::{CommandOutput, CommandRunner, CommandSpec};

type Effect = Arc<dyn Fn(&CommandSpec) + Send + Sync>;

#[derive(Clone)]
enum Reply {
    Output(CommandOutput),
    Missing,
}

struct Rule {
    pattern: String,
    replies: VecDeque<Reply>,
    effect: Option<Effect>,
}

/// Command runner answering from scripted rules.
///
/// A rule matches when its pattern is a prefix of the command line, where the
/// command line is `program args...` with the program given either verbatim
/// or by file name only. The longest matching pattern wins. Queued replies
/// are consumed in order and the last one repeats. Unmatched commands behave
/// like a program that is not installed.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `output` for commands starting with `pattern`.
    pub fn on(&self, pattern: &str, output: CommandOutput) -> &Self {
        self.push(pattern, Reply::Output(output), None)
    }

    /// Queue a "program not found" reply.
    pub fn on_missing(&self, pattern: &str) -> &Self {
        self.push(pattern, Reply::Missing, None)
    }

    /// Queue `output` and run `effect` whenever the rule fires.
    pub fn on_effect<F>(&self, pattern: &str, output: CommandOutput, effect: F) -> &Self
    where
        F: Fn(&CommandSpec) + Send + Sync + 'static,
    {
        self.push(pattern, Reply::Output(output), Some(Arc::new(effect)))
    }

    fn push(&self, pattern: &str, reply: Reply, effect: Option<Effect>) -> &Self {
        let mut rules = self.rules.lock().unwrap();
        match rules.iter_mut().find(|r| r.pattern == pattern) {
            Some(rule) => {
                rule.replies.push_back(reply);
                if effect.is_some() {
                    rule.effect = effect;
                }
            }
            None => rules.push(Rule {
                pattern: pattern.to_string(),
                replies: VecDeque::from([reply]),
                effect,
            }),
        }
        self
    }

    /// Every command run so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Command lines run so far, with programs shortened to file names.
    pub fn call_lines(&self) -> Vec<String> {
        self.calls().iter().map(short_display).collect()
    }

    /// Whether any command line started with `prefix`.
    pub fn was_called(&self, prefix: &str) -> bool {
        self.calls()
            .iter()
            .any(|c| c.display().starts_with(prefix) || short_display(c).starts_with(prefix))
    }
}

fn short_display(spec: &CommandSpec) -> String {
    let name = Path::new(&spec.program)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| spec.program.clone());
    if spec.args.is_empty() {
        name
    } else {
        format!("{} {}", name, spec.args.join(" "))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());

        let full = spec.display();
        let short = short_display(spec);

        let (reply, effect) = {
            let mut rules = self.rules.lock().unwrap();
            let rule = rules
                .iter_mut()
                .filter(|r| full.starts_with(&r.pattern) || short.starts_with(&r.pattern))
                .max_by_key(|r| r.pattern.len());

            match rule {
                Some(rule) => {
                    let reply = if rule.replies.len() > 1 {
                        rule.replies.pop_front()
                    } else {
                        rule.replies.front().cloned()
                    };
                    (reply, rule.effect.clone())
                }
                None => (None, None),
            }
        };

        match reply {
            Some(Reply::Output(output)) => {
                if let Some(effect) = effect {
                    effect(spec);
                }
                Ok(output)
            }
            Some(Reply::Missing) | None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", spec.program),
            )),
        }
    }
}
