//! REPL session management

use colored::Colorize;
use eyre::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::dispatcher::Dispatcher;
use crate::domain::{TaskError, TaskResult, TaskStatus};
use crate::llm::Role;

/// Interactive REPL session over one dispatcher
pub struct ReplSession {
    dispatcher: Dispatcher,
}

/// Result of handling a slash command
enum SlashResult {
    Continue,
    Quit,
}

impl ReplSession {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Run the REPL main loop
    pub async fn run(&mut self, initial_task: Option<String>) -> Result<()> {
        self.print_welcome();

        if let Some(task) = initial_task {
            println!("{} {}", ">".bright_green(), task);
            let result = self.dispatcher.dispatch(&task).await;
            print_result(&result);
        }

        let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;

        loop {
            let readline = rl.readline(&format!("{} ", ">".bright_green()));

            match readline {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(input);

                    match self.local_command(input) {
                        Some(SlashResult::Quit) => break,
                        Some(SlashResult::Continue) => continue,
                        None => {
                            let result = self.dispatcher.dispatch(input).await;
                            print_result(&result);
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    return Err(eyre::eyre!("Readline error: {}", err));
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    /// Session-control commands handled without dispatching
    fn local_command(&mut self, input: &str) -> Option<SlashResult> {
        let cmd = input.split_whitespace().next().unwrap_or("");
        match cmd {
            "/help" | "/h" => {
                self.print_help();
                Some(SlashResult::Continue)
            }
            "/quit" | "/q" | "/exit" => Some(SlashResult::Quit),
            "/clear" | "/c" => {
                let fresh = self.dispatcher.task_system().make_handler();
                *self.dispatcher.chat_mut() = fresh;
                println!("{}", "Conversation cleared.".dimmed());
                Some(SlashResult::Continue)
            }
            "/history" => {
                self.print_history();
                Some(SlashResult::Continue)
            }
            _ => None,
        }
    }

    fn print_welcome(&self) {
        println!();
        println!("{}", "Taskweave Interactive REPL".bright_cyan().bold());
        println!(
            "Free text chats; {} runs a workflow expression; {} invokes a template.",
            "(...)".yellow(),
            "/task".yellow()
        );
        println!("Type {} for help, {} to quit", "/help".yellow(), "/quit".yellow());
        println!();
    }

    fn print_help(&self) {
        println!();
        println!("{}", "Available Commands:".bright_cyan());
        println!("  {:24} Show this help", "/help".yellow());
        println!("  {:24} Exit the REPL", "/quit".yellow());
        println!("  {:24} Clear conversation history", "/clear".yellow());
        println!("  {:24} Show conversation history", "/history".yellow());
        println!("  {:24} Invoke an atomic template", "/task name key=value".yellow());
        println!("  {:24} Evaluate a workflow expression", "/task (sexpr)".yellow());
        println!("  {:24} Chat with plan-mode injection", "/plan text".yellow());
        println!("  {:24} Evaluate a workflow expression", "(sexpr)".yellow());
        println!();
    }

    fn print_history(&mut self) {
        let history = self.dispatcher.chat_mut().history();
        if history.is_empty() {
            println!("{}", "No conversation history.".dimmed());
            return;
        }

        println!();
        println!("{}", "Conversation History:".bright_cyan());
        for (i, msg) in history.messages().iter().enumerate() {
            let role = match msg.role {
                Role::User => "User".bright_green(),
                Role::Assistant => "Assistant".bright_blue(),
                Role::Tool => "Tool".bright_yellow(),
            };
            let preview: String = msg.content.chars().take(50).collect();
            let suffix = if msg.content.chars().count() > 50 { "..." } else { "" };
            println!("  {}. {}: {}{}", i + 1, role, preview, suffix);
        }
        println!();
    }
}

/// Print a dispatch result: content, or a one-line error summary
fn print_result(result: &TaskResult) {
    match result.status {
        TaskStatus::Complete | TaskStatus::Partial => {
            println!("{}", result.content);
        }
        TaskStatus::Continuation => {
            // Continuations are resolved by the dispatcher; reaching here
            // means an orchestration gap
            println!("{} unresolved continuation", "Error:".red());
        }
        TaskStatus::Failed => match result.error() {
            Some(TaskError::ResourceExhaustion {
                resource, used, limit, ..
            }) => {
                println!(
                    "{} resource exhaustion ({}): used {} of {}",
                    "Error:".red(),
                    resource,
                    used,
                    limit
                );
            }
            Some(TaskError::TaskFailure { reason, message, .. }) => {
                println!("{} ({}) {}", "Error:".red(), reason, message);
            }
            None => {
                println!("{} task failed", "Error:".red());
            }
        },
    }
    println!();
}
