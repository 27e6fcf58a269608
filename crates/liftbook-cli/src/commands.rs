//! Command parsing and execution.
//!
//! Every failure ends in exactly one line for the user: the server's
//! reason when it gave one, otherwise a generic message for the command.

use liftbook_core::models::{ProfileUpdate, SessionState};
use liftbook_core::{Config, SessionError, SessionStore};
use tracing::warn;

const USAGE: &str = "\
Usage: liftbook <command>

Commands:
  status                      Show who is signed in
  sign-in [email]             Sign in (password is prompted)
  sign-out                    Sign out and forget stored credentials
  register <name> <email>     Create an account (password is prompted)
  profile [--name <name>] [--password]
                              Update your name and/or password
  history                     List logged exercises by day
  exercise <id>               Show an exercise
  done <id>                   Log an exercise as done now";

/// Password can come from the environment for scripted use
const PASSWORD_ENV: &str = "LIFTBOOK_PASSWORD";
const EMAIL_ENV: &str = "LIFTBOOK_EMAIL";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Status,
    SignIn { email: Option<String> },
    SignOut,
    Register { name: String, email: String },
    Profile { name: Option<String>, change_password: bool },
    History,
    Exercise { id: String },
    Done { id: String },
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self, &'static str> {
        let rest: Vec<&str> = args.iter().skip(1).map(String::as_str).collect();
        let command = match (args.first().map(String::as_str), rest.as_slice()) {
            (None, _) | (Some("status"), []) => Command::Status,
            (Some("sign-in"), []) => Command::SignIn { email: None },
            (Some("sign-in"), [email]) => Command::SignIn {
                email: Some(email.to_string()),
            },
            (Some("sign-out"), []) => Command::SignOut,
            (Some("register"), [name, email]) => Command::Register {
                name: name.to_string(),
                email: email.to_string(),
            },
            (Some("profile"), flags) => Self::parse_profile(flags)?,
            (Some("history"), []) => Command::History,
            (Some("exercise"), [id]) => Command::Exercise { id: id.to_string() },
            (Some("done"), [id]) => Command::Done { id: id.to_string() },
            _ => return Err(USAGE),
        };
        Ok(command)
    }

    fn parse_profile(flags: &[&str]) -> Result<Self, &'static str> {
        let mut name = None;
        let mut change_password = false;
        let mut iter = flags.iter();
        while let Some(flag) = iter.next() {
            match *flag {
                "--name" => name = Some(iter.next().ok_or(USAGE)?.to_string()),
                "--password" => change_password = true,
                _ => return Err(USAGE),
            }
        }
        if name.is_none() && !change_password {
            return Err(USAGE);
        }
        Ok(Command::Profile { name, change_password })
    }
}

fn prompt_password(prompt: &str) -> Result<String, String> {
    rpassword::prompt_password(prompt).map_err(|e| format!("Could not read password: {}", e))
}

fn prompt_line(prompt: &str) -> Result<String, String> {
    use std::io::Write;

    print!("{}", prompt);
    std::io::stdout().flush().map_err(|e| e.to_string())?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).map_err(|e| e.to_string())?;
    Ok(line.trim().to_string())
}

fn fail(err: SessionError, fallback: &str) -> String {
    warn!(error = %err, "Command failed");
    err.user_message(fallback)
}

/// Run a command. `Err` holds the single message to show the user.
pub async fn run(command: Command, session: &SessionStore, config: &mut Config) -> Result<(), String> {
    match command {
        Command::Status => {
            match session.get_state() {
                SessionState::Authenticated(user) => {
                    println!("Signed in as {} <{}>", user.name, user.email);
                    if let Some(avatar) = user.avatar {
                        println!("Avatar: {}", avatar);
                    }
                }
                _ => println!("Not signed in"),
            }
            Ok(())
        }

        Command::SignIn { email } => {
            let email = match email.or_else(|| std::env::var(EMAIL_ENV).ok()) {
                Some(email) => email,
                None => match config.last_email.clone() {
                    Some(last) => {
                        let typed = prompt_line(&format!("E-mail [{}]: ", last))?;
                        if typed.is_empty() { last } else { typed }
                    }
                    None => prompt_line("E-mail: ")?,
                },
            };
            let email = required(email, "Enter your e-mail")?;
            let password = match std::env::var(PASSWORD_ENV) {
                Ok(password) => password,
                Err(_) => prompt_password("Password: ")?,
            };
            let password = required(password, "Enter your password")?;

            let user = session
                .sign_in(&email, &password)
                .await
                .map_err(|e| fail(e, "Could not sign in. Try again later."))?;

            config.last_email = Some(email);
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
            println!("Welcome, {}!", user.name);
            Ok(())
        }

        Command::SignOut => {
            session.sign_out().await;
            println!("Signed out");
            Ok(())
        }

        Command::Register { name, email } => {
            let password = prompt_password("Password: ")?;
            session
                .register(&name, &email, &password)
                .await
                .map_err(|e| fail(e, "Could not create the account. Try again later."))?;
            println!("Account created. Sign in with `liftbook sign-in {}`.", email);
            Ok(())
        }

        Command::Profile { name, change_password } => {
            let mut update = ProfileUpdate {
                name,
                ..ProfileUpdate::default()
            };
            if change_password {
                let old = prompt_password("Current password: ")?;
                let new = prompt_password("New password: ")?;
                let confirm = prompt_password("Confirm new password: ")?;
                if new != confirm {
                    return Err("Passwords do not match".to_string());
                }
                update = update.with_password(&old, &new);
            }
            if update.is_empty() {
                return Err("Nothing to update".to_string());
            }

            let user = session
                .update_profile(update)
                .await
                .map_err(|e| fail(e, "Could not update your profile. Try again later."))?;
            println!("Profile updated: {}", user.name);
            Ok(())
        }

        Command::History => {
            let days = session
                .client()
                .fetch_history()
                .await
                .map_err(|e| fail(e, "Could not load your history."))?;
            if days.is_empty() {
                println!("No exercises logged yet.");
            }
            for day in days {
                println!("{}", day.title);
                for entry in day.data {
                    println!("  {}  {:<24} {}", entry.hour, entry.name, entry.group);
                }
            }
            Ok(())
        }

        Command::Exercise { id } => {
            let exercise = session
                .client()
                .fetch_exercise(&id)
                .await
                .map_err(|e| fail(e, "Could not load the exercise details."))?;
            println!("{} ({})", exercise.name, exercise.group);
            println!("{}", exercise.display_sets());
            Ok(())
        }

        Command::Done { id } => {
            session
                .client()
                .register_exercise(&id)
                .await
                .map_err(|e| fail(e, "Could not log the exercise."))?;
            println!("Logged!");
            Ok(())
        }
    }
}

/// Reject blank input with `message`
fn required(value: String, message: &str) -> Result<String, String> {
    if value.is_empty() {
        Err(message.to_string())
    } else {
        Ok(value)
    }
}
