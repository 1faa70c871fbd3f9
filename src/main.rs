//! Command-line front end for the VoteSmart core.
//!
//! Each invocation restores the saved session, runs one command against the
//! configured store, and saves the session again, so `login` followed by
//! `vote` works across invocations.

use std::io::{self, BufRead, Write};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use clap::{builder::PossibleValuesParser, Arg, ArgAction, ArgMatches, Command};
use log::{error, info};
use thiserror::Error;

use votesmart::{
    auth::{AuthError, StepKind},
    credentials::CredentialError,
    engine::{ElectionError, ElectionResults},
    error::Error as StoreError,
    model::{
        election::{CandidateSpec, ElectionSpec},
        identity::{Pin, Registration, Toggle},
        session::{AuthStep, Session, UiPreferences},
        store::Id,
    },
    App, Config,
};

const PROGRAM_NAME: &str = "votesmart";

const ABOUT_TEXT: &str = "Manage VoteSmart elections from the command line.

Configuration is read from Votesmart.toml and VOTESMART_* environment variables.

EXIT CODES:
     0: Success.
     1: The command was rejected or failed.";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .subcommand_required(true)
        .subcommand(
            Command::new("register")
                .about("Register a new voter account")
                .arg(required("name", "Display name"))
                .arg(required("email", "Email address, used to log in"))
                .arg(required("password", "Account password"))
                .arg(
                    Arg::new("pin")
                        .long("pin")
                        .help("Four-digit PIN, asked for at the end of every login")
                        .value_parser(Pin::from_str)
                        .required(true),
                )
                .arg(
                    Arg::new("biometrics")
                        .long("biometrics")
                        .help("Enrol biometrics as a login step")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("login")
                .about("Log in, walking through every enabled step")
                .arg(required("email", "Email address"))
                .arg(required("password", "Account password")),
        )
        .subcommand(Command::new("logout").about("End the current session"))
        .subcommand(Command::new("whoami").about("Show who is logged in"))
        .subcommand(Command::new("elections").about("List every election"))
        .subcommand(
            Command::new("create-election")
                .about("Create an election (administrators only)")
                .arg(required("title", "Election title"))
                .arg(
                    Arg::new("description")
                        .long("description")
                        .help("Longer description"),
                )
                .arg(
                    Arg::new("start")
                        .long("start")
                        .help("Opening time, RFC 3339")
                        .value_parser(parse_time)
                        .required(true),
                )
                .arg(
                    Arg::new("end")
                        .long("end")
                        .help("Closing time, RFC 3339")
                        .value_parser(parse_time)
                        .required(true),
                )
                .arg(
                    Arg::new("candidate")
                        .long("candidate")
                        .help("A candidate as NAME or NAME:POSITION; repeat for each")
                        .value_parser(parse_candidate)
                        .action(ArgAction::Append)
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("delete-election")
                .about("Delete an election and its votes (administrators only)")
                .arg(id_arg("election", "Election ID")),
        )
        .subcommand(
            Command::new("vote")
                .about("Cast your vote")
                .arg(id_arg("election", "Election ID"))
                .arg(id_arg("candidate", "Candidate ID"))
                .arg(
                    Arg::new("key")
                        .long("key")
                        .help("ID of the security key you are presenting")
                        .value_parser(Id::from_str),
                ),
        )
        .subcommand(
            Command::new("results")
                .about("Show the current tally of an election")
                .arg(id_arg("election", "Election ID"))
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print the results as JSON")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("history").about("Show your recent logins"))
        .subcommand(Command::new("my-votes").about("List the votes you have cast"))
        .subcommand(
            Command::new("add-key")
                .about("Register a hardware security key")
                .arg(Arg::new("name").help("A name to recognise the key by").required(true)),
        )
        .subcommand(
            Command::new("setting")
                .about("Turn one of your account settings on or off")
                .arg(
                    Arg::new("setting")
                        .value_parser(PossibleValuesParser::new([
                            "biometric-auth",
                            "security-key",
                            "require-key-for-voting",
                        ]))
                        .required(true),
                )
                .arg(
                    Arg::new("value")
                        .value_parser(PossibleValuesParser::new(["on", "off"]))
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("prefs")
                .about("Show or change display preferences")
                .arg(
                    Arg::new("dark-mode")
                        .long("dark-mode")
                        .value_parser(PossibleValuesParser::new(["on", "off"])),
                )
                .arg(Arg::new("font-size").long("font-size"))
                .arg(Arg::new("font-style").long("font-style")),
        )
}

fn required(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .help(help)
        .action(ArgAction::Set)
        .required(true)
}

fn id_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .help(help)
        .value_parser(Id::from_str)
        .required(true)
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|err| format!("expected an RFC 3339 timestamp: {err}"))
}

fn parse_candidate(value: &str) -> Result<CandidateSpec, String> {
    let (name, position) = value.split_once(':').unwrap_or((value, ""));
    if name.trim().is_empty() {
        return Err("candidate name must not be empty".to_string());
    }
    Ok(CandidateSpec::new(name.trim(), position.trim()))
}

/// Errors that this program may produce.
#[derive(Debug, Error)]
enum Error {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] figment::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Election(#[from] ElectionError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0}")]
    Usage(String),
}

/// Run one command. Prompts are written to `output` and answers read from `input`.
fn run(
    args: &ArgMatches,
    app: &App,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<(), Error> {
    let mut session = app.restore_session()?;
    let result = dispatch(args, app, &mut session, input, output);
    // Persist whatever state we reached, even on failure.
    app.save_session(&session)?;
    result
}

fn dispatch(
    args: &ArgMatches,
    app: &App,
    session: &mut Session,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<(), Error> {
    let engine = app.engine();
    let credentials = app.credentials();
    match args.subcommand() {
        Some(("register", args)) => {
            let identity = credentials.register(Registration {
                name: string(args, "name"),
                email: string(args, "email"),
                password: string(args, "password"),
                pin: *one::<Pin>(args, "pin")?,
                use_biometrics: args.get_flag("biometrics"),
            })?;
            writeln!(output, "Registered {} <{}>", identity.name, identity.email)?;
        }
        Some(("login", args)) => {
            let identity = log_in(
                app,
                session,
                &string(args, "email"),
                &string(args, "password"),
                input,
                output,
            )?;
            writeln!(output, "Welcome, {}!", identity.name)?;
        }
        Some(("logout", _)) => {
            app.auth().logout(session)?;
            writeln!(output, "Logged out")?;
        }
        Some(("whoami", _)) => match session.current() {
            Some(identity) => writeln!(
                output,
                "{} <{}> ({:?})",
                identity.name, identity.email, identity.role
            )?,
            None => writeln!(output, "Not logged in")?,
        },
        Some(("elections", _)) => {
            let now = Utc::now();
            for election in engine.list_elections()? {
                writeln!(
                    output,
                    "{}  {}  [{:?}]  {} to {}",
                    election.id,
                    election.title,
                    election.status_at(now),
                    election.start_time.to_rfc3339(),
                    election.end_time.to_rfc3339(),
                )?;
                for candidate in &election.candidates {
                    writeln!(output, "    {}  {} {}", candidate.id, candidate.name, candidate.position)?;
                }
            }
        }
        Some(("create-election", args)) => {
            let spec = ElectionSpec {
                title: string(args, "title"),
                description: string(args, "description"),
                start_time: *one::<DateTime<Utc>>(args, "start")?,
                end_time: *one::<DateTime<Utc>>(args, "end")?,
                candidates: args
                    .get_many::<CandidateSpec>("candidate")
                    .into_iter()
                    .flatten()
                    .cloned()
                    .collect(),
            };
            let election = engine.create_election(session, spec)?;
            writeln!(output, "Created election {}", election.id)?;
        }
        Some(("delete-election", args)) => {
            let removed = engine.delete_election(session, *one::<Id>(args, "election")?)?;
            writeln!(output, "Deleted election and {removed} votes")?;
        }
        Some(("vote", args)) => {
            let election_id = *one::<Id>(args, "election")?;
            let candidate_id = *one::<Id>(args, "candidate")?;
            let vote = match args.get_one::<Id>("key") {
                Some(key) => {
                    engine.cast_vote_with_security_key(session, election_id, candidate_id, *key)?
                }
                None => engine.cast_vote(session, election_id, candidate_id)?,
            };
            writeln!(output, "Vote recorded. Receipt: {} ({})", vote.id, vote.signature)?;
        }
        Some(("results", args)) => {
            let results = engine.get_election_results(*one::<Id>(args, "election")?)?;
            if args.get_flag("json") {
                let json = serde_json::to_string_pretty(&results).map_err(StoreError::from)?;
                writeln!(output, "{json}")?;
            } else {
                print_results(&results, output)?;
            }
        }
        Some(("history", _)) => {
            let identity = credentials.reload(session)?;
            for entry in identity.login_history.iter().rev() {
                writeln!(output, "{}  {:?}", entry.timestamp.to_rfc3339(), entry.event)?;
            }
        }
        Some(("my-votes", _)) => {
            for vote in engine.my_votes(session)? {
                let title = engine
                    .get_election(vote.election_id)
                    .map(|election| election.title)
                    .unwrap_or_else(|_| "(deleted election)".to_string());
                writeln!(output, "{}  {}  {}", vote.cast_at.to_rfc3339(), title, vote.candidate_id)?;
            }
        }
        Some(("add-key", args)) => {
            let key = credentials.register_security_key(session, &string(args, "name"))?;
            writeln!(output, "Registered security key {} ({})", key.id, key.name)?;
        }
        Some(("setting", args)) => {
            let toggle = match string(args, "setting").as_str() {
                "biometric-auth" => Toggle::BiometricAuth,
                "security-key" => Toggle::SecurityKey,
                _ => Toggle::RequireSecurityKeyForVoting,
            };
            let value = string(args, "value") == "on";
            credentials.update_setting(session, toggle, value)?;
            writeln!(output, "Updated")?;
        }
        Some(("prefs", args)) => {
            let mut prefs = UiPreferences::load(app.store())?;
            if let Some(dark_mode) = args.get_one::<String>("dark-mode") {
                prefs.dark_mode = dark_mode == "on";
            }
            if let Some(font_size) = args.get_one::<String>("font-size") {
                prefs.font_size = font_size.clone();
            }
            if let Some(font_style) = args.get_one::<String>("font-style") {
                prefs.font_style = font_style.clone();
            }
            prefs.save(app.store())?;
            writeln!(
                output,
                "dark mode: {}, font: {} {}",
                if prefs.dark_mode { "on" } else { "off" },
                prefs.font_size,
                prefs.font_style
            )?;
        }
        Some((other, _)) => return Err(Error::Usage(format!("unknown command {other}"))),
        None => return Err(Error::Usage("no command given".to_string())),
    }
    Ok(())
}

/// Walk the session through every login step, prompting as needed.
fn log_in(
    app: &App,
    session: &mut Session,
    email: &str,
    password: &str,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<votesmart::model::identity::Identity, Error> {
    let auth = app.auth();
    let mut step = auth.attempt_primary_login(session, email, password)?;
    loop {
        step = match step {
            AuthStep::SecurityKeyAuth => {
                if confirm("Touch your security key. Did it respond?", input, output)? {
                    auth.advance_after_security_key(session)?
                } else {
                    return Err(auth.fail(session, StepKind::SecurityKey).into());
                }
            }
            AuthStep::Biometric => {
                if confirm("Complete the biometric check. Did it pass?", input, output)? {
                    auth.advance_after_biometric(session)?
                } else {
                    return Err(auth.fail(session, StepKind::Biometric).into());
                }
            }
            AuthStep::Pin => {
                let answer = prompt("PIN:", input, output)?;
                // A malformed PIN is not an attempt.
                let pin = match answer.parse::<Pin>() {
                    Ok(pin) => pin,
                    Err(err) => {
                        writeln!(output, "{err}")?;
                        continue;
                    }
                };
                match auth.complete_pin(session, &pin) {
                    Ok(identity) => return Ok(identity),
                    Err(err) if err.is_retryable() => {
                        writeln!(output, "{err}")?;
                        AuthStep::Pin
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            AuthStep::Login => {
                return Err(Error::Usage("login was reset unexpectedly".to_string()));
            }
        };
    }
}

fn print_results(results: &ElectionResults, output: &mut impl Write) -> io::Result<()> {
    for standing in &results.standings {
        writeln!(
            output,
            "{}: {} vote{}",
            standing.candidate.name,
            standing.votes,
            if standing.votes != 1 { "s" } else { "" }
        )?;
    }
    match (&results.winner, results.total_votes()) {
        (_, 0) => writeln!(output, "No votes cast yet"),
        (Some(winner), _) => writeln!(output, "Winner: {}", winner.name),
        (None, _) => writeln!(output, "No winner: tie"),
    }
}

fn prompt(question: &str, input: &mut impl BufRead, output: &mut impl Write) -> io::Result<String> {
    write!(output, "{question} ")?;
    output.flush()?;
    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "no more input"));
    }
    Ok(answer.trim().to_string())
}

fn confirm(question: &str, input: &mut impl BufRead, output: &mut impl Write) -> io::Result<bool> {
    let answer = prompt(&format!("{question} [y/n]"), input, output)?;
    Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
}

fn string(args: &ArgMatches, name: &str) -> String {
    args.get_one::<String>(name).cloned().unwrap_or_default()
}

fn one<'a, T: Clone + Send + Sync + 'static>(args: &'a ArgMatches, name: &str) -> Result<&'a T, Error> {
    args.get_one::<T>(name)
        .ok_or_else(|| Error::Usage(format!("missing argument {name}")))
}

fn main() {
    // Set up logging.
    if let Err(err) = log4rs::init_file("log4rs.yaml", Default::default()) {
        eprintln!("Logging disabled: {err}");
    }

    let args = cli().get_matches();
    let result = Config::load()
        .map_err(Error::from)
        .and_then(|config| Ok(App::new(config)?))
        .and_then(|app| {
            info!("Running {:?}", args.subcommand_name());
            run(&args, &app, &mut io::stdin().lock(), &mut io::stdout().lock())
        });

    if let Err(err) = result {
        error!("{err}");
        eprintln!("error: {err}");
        std::process::exit(1)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use chrono::Duration;
    use figment::{
        providers::{Format, Toml},
        Figment,
    };

    use super::*;

    const CONFIG: &str = r#"
        signing_secret = "cli test secret"
        admin_email = "admin@votesmart.test"
        admin_name = "Returning Officer"
        admin_password = "admin-password"
        admin_pin = "0000"
    "#;

    fn app() -> App {
        // Commands run library code, so enable logging.
        log4rs_test_utils::test_logging::init_logging_once_for(["votesmart"], None, None);
        let config: Config = Figment::new()
            .merge(Toml::string(CONFIG))
            .extract()
            .unwrap();
        App::new(config).unwrap()
    }

    /// Run a command line with the given stdin, returning stdout.
    fn exec(app: &App, line: &[&str], stdin: &str) -> Result<String, Error> {
        let args = cli()
            .try_get_matches_from(std::iter::once(PROGRAM_NAME).chain(line.iter().copied()))
            .unwrap();
        let mut output = Vec::new();
        run(&args, app, &mut Cursor::new(stdin.as_bytes()), &mut output)?;
        Ok(String::from_utf8(output).unwrap())
    }

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn rejects_bad_pin_and_times() {
        assert!(cli()
            .try_get_matches_from([PROGRAM_NAME, "register", "--name", "A", "--email", "a@b.c", "--password", "p", "--pin", "12"])
            .is_err());
        assert!(cli()
            .try_get_matches_from([PROGRAM_NAME, "create-election", "--title", "T", "--start", "yesterday", "--end", "2030-01-01T00:00:00Z", "--candidate", "A"])
            .is_err());
    }

    #[test]
    fn login_create_vote_results() {
        let app = app();

        // Admin creates an election. The first PIN is malformed and does not count.
        exec(&app, &["login", "--email", "admin@votesmart.test", "--password", "admin-password"], "12\n0000\n")
            .unwrap();
        let start = (Utc::now() - Duration::hours(1)).to_rfc3339();
        let end = (Utc::now() + Duration::hours(1)).to_rfc3339();
        let created = exec(
            &app,
            &["create-election", "--title", "Council", "--start", &start, "--end", &end, "--candidate", "Chris Riches:Chair", "--candidate", "Parry Hotter"],
            "",
        )
        .unwrap();
        let election_id = created.trim().rsplit(' ').next().unwrap().to_string();
        exec(&app, &["logout"], "").unwrap();

        // A voter registers, logs in with a wrong PIN first, and votes.
        exec(&app, &["register", "--name", "Ada", "--email", "ada@example.com", "--password", "pw", "--pin", "1234"], "")
            .unwrap();
        let login = exec(&app, &["login", "--email", "ada@example.com", "--password", "pw"], "9999\n1234\n").unwrap();
        assert!(login.contains("2 attempts remaining"));
        assert!(login.contains("Welcome, Ada!"));

        let election = app.engine().get_election(election_id.parse().unwrap()).unwrap();
        let candidate = election.candidates[1].id.to_string();
        exec(&app, &["vote", &election_id, &candidate], "").unwrap();
        assert!(matches!(
            exec(&app, &["vote", &election_id, &candidate], ""),
            Err(Error::Election(ElectionError::DuplicateVote))
        ));

        let results = exec(&app, &["results", &election_id], "").unwrap();
        assert!(results.contains("Parry Hotter: 1 vote\n"));
        assert!(results.contains("Winner: Parry Hotter"));

        let json = exec(&app, &["results", &election_id, "--json"], "").unwrap();
        let json: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(json["counts"][&candidate], 1);

        let history = exec(&app, &["history"], "").unwrap();
        assert_eq!(history.lines().count(), 2);
        assert!(exec(&app, &["my-votes"], "").unwrap().contains("Council"));
    }

    #[test]
    fn failed_security_key_step_restarts_login() {
        let app = app();
        exec(&app, &["register", "--name", "Ada", "--email", "ada@example.com", "--password", "pw", "--pin", "1234"], "")
            .unwrap();
        exec(&app, &["login", "--email", "ada@example.com", "--password", "pw"], "1234\n").unwrap();
        exec(&app, &["add-key", "Desk key"], "").unwrap();
        exec(&app, &["setting", "security-key", "on"], "").unwrap();
        exec(&app, &["logout"], "").unwrap();

        assert!(matches!(
            exec(&app, &["login", "--email", "ada@example.com", "--password", "pw"], "n\n"),
            Err(Error::Auth(AuthError::SecurityKeyFailed))
        ));
        assert!(exec(&app, &["whoami"], "").unwrap().contains("Not logged in"));

        exec(&app, &["login", "--email", "ada@example.com", "--password", "pw"], "y\n1234\n").unwrap();
        assert!(exec(&app, &["whoami"], "").unwrap().contains("ada@example.com"));
    }

    #[test]
    fn prefs_persist() {
        let app = app();
        exec(&app, &["prefs", "--dark-mode", "on"], "").unwrap();
        let shown = exec(&app, &["prefs", "--font-size", "18px"], "").unwrap();
        assert!(shown.contains("dark mode: on, font: 18px"));
    }
}
