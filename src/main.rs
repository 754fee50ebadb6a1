use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use knowledge_tracer::db::Database;
use knowledge_tracer::models::{BloomsLevel, ConceptMastery, JsonOutput, LearningMode, UpdateEvent};
use knowledge_tracer::{snapshot, Interaction, MisconceptionStatus};

const DEFAULT_DB_NAME: &str = "ktrace.db";

#[derive(Parser)]
#[command(name = "ktrace")]
#[command(about = "Track per-learner mastery, review schedules and misconceptions")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Record a graded answer for a learner
    Record {
        /// Learner ID
        learner: String,

        /// Concept ID
        concept: String,

        /// Outcome: correct/incorrect
        #[arg(long, short)]
        outcome: String,

        /// Concept display name (defaults to the ID)
        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value = "general")]
        subject: String,

        #[arg(long, default_value = "general")]
        topic: String,

        /// What the learner answered
        #[arg(long, short, default_value = "")]
        answer: String,

        /// What the answer should have been
        #[arg(long, short, default_value = "")]
        expected: String,

        /// Self-reported confidence, 0.0 to 1.0
        #[arg(long, short)]
        confidence: Option<f64>,

        #[arg(long, short, default_value = "cli")]
        session: String,

        /// Mode: learn/practice/review/debug
        #[arg(long, short, default_value = "learn")]
        mode: String,

        /// Comma-separated curriculum references
        #[arg(long)]
        refs: Option<String>,

        /// Bloom's level (remember..create or 1-6)
        #[arg(long)]
        blooms: Option<String>,
    },

    /// Show one concept's knowledge state
    Show { learner: String, concept: String },

    /// List concepts due for review
    Due { learner: String },

    /// Per-subject mastery summary
    Summary { learner: String },

    /// Concepts grouped by subject and topic
    Clusters { learner: String },

    /// Open misconceptions
    Misconceptions {
        learner: String,

        /// Only show one status: active/resolving
        #[arg(long)]
        status: Option<String>,
    },

    /// Over- and under-confident concepts
    Divergence { learner: String },

    /// Profile statistics
    Stats { learner: String },

    /// List learners with stored profiles
    Learners,

    /// Write a learner's snapshot to stdout or a file
    Export {
        learner: String,

        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Replace a learner's profile with a snapshot file
    Import { learner: String, path: PathBuf },
}

fn get_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("KTRACE_DB") {
        return PathBuf::from(path);
    }

    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("knowledge-tracer");

    std::fs::create_dir_all(&config_dir).ok();
    config_dir.join(DEFAULT_DB_NAME)
}

fn init_logging() {
    // Logs go to stderr so --json output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_json<T: Serialize>(data: T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(&JsonOutput::ok(data))?);
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = get_db_path();
    let db = Database::open(&db_path)?;
    db.init()?;

    match cli.command {
        Commands::Init => {
            if cli.json {
                print_json(())?;
            } else {
                println!("Database initialized at: {}", db_path.display());
            }
        }

        Commands::Record {
            learner,
            concept,
            outcome,
            name,
            subject,
            topic,
            answer,
            expected,
            confidence,
            session,
            mode,
            refs,
            blooms,
        } => {
            let is_correct = parse_outcome(&outcome).ok_or_else(|| {
                format!("Invalid outcome '{}'. Use: correct or incorrect", outcome)
            })?;
            let mode = LearningMode::from_str(&mode).ok_or_else(|| {
                format!("Invalid mode '{}'. Use: learn, practice, review or debug", mode)
            })?;

            let mut interaction =
                Interaction::new(&concept, name.unwrap_or_default(), subject, topic)
                    .answered(is_correct, answer, expected)
                    .in_session(session, mode)
                    .with_curriculum_refs(split_list(refs.as_deref()));
            if let Some(c) = confidence {
                interaction = interaction.with_confidence(c);
            }
            if let Some(level) = blooms {
                let level = BloomsLevel::from_str(&level)
                    .ok_or_else(|| format!("Invalid Bloom's level '{}'", level))?;
                interaction = interaction.with_blooms_level(level);
            }

            let now = Utc::now();
            let mut profile = db.load_profile(&learner)?;
            let events = profile.record_interaction_at(interaction.clone(), now)?;
            db.save_profile(&profile)?;
            db.log_interaction(&learner, &interaction, now)?;

            if cli.json {
                print_json(serde_json::json!({
                    "events": events,
                    "mastery": profile.get_node_mastery(concept.trim()),
                }))?;
            } else {
                println!("Recorded {} answer on '{}'.", if is_correct { "correct" } else { "incorrect" }, concept);
                for event in &events {
                    println!("  {}", describe_event(event));
                }
            }
        }

        Commands::Show { learner, concept } => {
            let profile = db.load_profile(&learner)?;
            match profile.get_node(&concept) {
                Some(node) if cli.json => print_json(node)?,
                Some(node) => {
                    println!("Concept: {} ({})", node.concept_name, node.concept_id);
                    println!("Subject: {} / {}", node.subject, node.topic);
                    println!("Mastery: {:.2} ({})", node.mastery, node.band().label());
                    println!(
                        "Confidence: {:.2} (self-reported {:.2})",
                        node.confidence, node.student_confidence
                    );
                    println!(
                        "Answers: {} ({:.0}% correct)",
                        node.interaction_count,
                        node.accuracy()
                    );
                    if let Some(level) = node.blooms_level {
                        println!("Bloom's level: {} ({}/6)", level.label(), level.as_i32());
                    }
                    if !node.curriculum_refs.is_empty() {
                        println!("Curriculum: {}", node.curriculum_refs.join(", "));
                    }

                    println!();
                    println!("--- Review ---");
                    println!("Ease factor: {:.2}", node.ease_factor);
                    println!("Interval: {} day(s), {} review(s)", node.interval, node.review_count);
                    println!("Last reviewed: {}", format_date(node.last_reviewed));
                    println!("Next review: {}", format_date(node.next_review_date));

                    if !node.misconceptions.is_empty() {
                        println!();
                        println!("--- Misconceptions ---");
                        for m in &node.misconceptions {
                            println!(
                                "{:<12} {:<10} x{:<3} '{}' (expected '{}')",
                                m.id,
                                m.status.as_str(),
                                m.occurrence_count(),
                                truncate(&m.pattern, 30),
                                truncate(&m.correct_understanding, 30)
                            );
                        }
                    }
                }
                None if cli.json => {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::<()>::err("Concept not found"))?
                    );
                }
                None => println!("Concept not found."),
            }
        }

        Commands::Due { learner } => {
            let due = db.load_profile(&learner)?.review_due();
            if cli.json {
                print_json(&due)?;
            } else if due.is_empty() {
                println!("Nothing due for review.");
            } else {
                println!("{:<16} {:<32} {:>7} {:>8} PRIORITY", "ID", "CONCEPT", "MASTERY", "INTERVAL");
                println!("{}", "-".repeat(80));
                for item in due {
                    println!(
                        "{:<16} {:<32} {:>7.2} {:>8} {:.1}",
                        truncate(&item.concept_id, 15),
                        truncate(&item.concept_name, 30),
                        item.mastery,
                        item.interval,
                        item.priority
                    );
                }
            }
        }

        Commands::Summary { learner } => {
            let summaries = db.load_profile(&learner)?.subject_summaries();
            if cli.json {
                print_json(&summaries)?;
            } else if summaries.is_empty() {
                println!("No concepts recorded.");
            } else {
                for s in summaries {
                    println!("=== {} ===", s.subject);
                    println!(
                        "Concepts: {} (mastered {}, learning {}, struggling {})",
                        s.total_concepts, s.mastered, s.learning, s.struggling
                    );
                    println!("Average mastery: {:.2}", s.average_mastery);
                    println!("Open misconceptions: {}", s.active_misconceptions);
                    println!("Strongest: {}", concept_list(&s.strongest));
                    println!("Weakest: {}", concept_list(&s.weakest));
                    if !s.recommended_focus.is_empty() {
                        println!("Focus next: {}", concept_list(&s.recommended_focus));
                    }
                    println!();
                }
            }
        }

        Commands::Clusters { learner } => {
            let clusters = db.load_profile(&learner)?.concept_clusters();
            if cli.json {
                print_json(&clusters)?;
            } else if clusters.is_empty() {
                println!("No concepts recorded.");
            } else {
                println!("{:<40} {:>8} {:>7} {:>6} MODE", "CLUSTER", "CONCEPTS", "MASTERY", "ISSUES");
                println!("{}", "-".repeat(72));
                for c in clusters {
                    println!(
                        "{:<40} {:>8} {:>7.2} {:>6} {}",
                        truncate(&c.key, 38),
                        c.concept_ids.len(),
                        c.average_mastery,
                        c.active_misconceptions,
                        c.suggested_mode.label()
                    );
                }
            }
        }

        Commands::Misconceptions { learner, status } => {
            let mut active = db.load_profile(&learner)?.active_misconceptions();
            if let Some(status) = status {
                let status = MisconceptionStatus::from_str(&status).ok_or_else(|| {
                    format!("Invalid status '{}'. Use: active or resolving", status)
                })?;
                active.retain(|m| m.status == status);
            }
            if cli.json {
                print_json(&active)?;
            } else if active.is_empty() {
                println!("No open misconceptions.");
            } else {
                println!("{:<30} {:<30} {:>5} STATUS", "CONCEPT", "PATTERN", "SEEN");
                println!("{}", "-".repeat(78));
                for m in active {
                    println!(
                        "{:<30} {:<30} {:>5} {}",
                        truncate(&m.concept_name, 28),
                        truncate(&m.pattern, 28),
                        m.occurrence_count,
                        m.status.as_str()
                    );
                }
            }
        }

        Commands::Divergence { learner } => {
            let report = db.load_profile(&learner)?.confidence_divergence();
            if cli.json {
                print_json(&report)?;
            } else {
                println!("Average divergence: {:.2}", report.avg_divergence);
                println!("Overconfident: {}", join_or_dash(&report.overconfident));
                println!("Underconfident: {}", join_or_dash(&report.underconfident));
            }
        }

        Commands::Stats { learner } => {
            let stats = db.load_profile(&learner)?.stats();
            if cli.json {
                print_json(&stats)?;
            } else {
                println!("=== Learner Statistics ===");
                println!("Concepts: {}", stats.total_concepts);
                println!("Interactions: {}", stats.total_interactions);
                println!("Mastered (0.8+): {}", stats.mastered);
                println!("Learning: {}", stats.learning);
                println!("Struggling: {}", stats.struggling);
                println!("Due for review: {}", stats.due_now);
                println!("Open misconceptions: {}", stats.active_misconceptions);
                println!("Overall mastery: {:.2}", stats.overall_mastery);
            }
        }

        Commands::Learners => {
            let learners = db.list_learners()?;
            if cli.json {
                print_json(&learners)?;
            } else if learners.is_empty() {
                println!("No learners found.");
            } else {
                println!("{:<30} {:>12} UPDATED", "LEARNER", "INTERACTIONS");
                println!("{}", "-".repeat(70));
                for l in learners {
                    println!("{:<30} {:>12} {}", truncate(&l.learner_id, 28), l.interactions, l.updated_at);
                }
            }
        }

        Commands::Export { learner, output } => {
            let text = snapshot::serialize(&db.load_profile(&learner)?)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &text)?;
                    if cli.json {
                        print_json(serde_json::json!({ "path": path }))?;
                    } else {
                        println!("Exported '{}' to {}", learner, path.display());
                    }
                }
                None if cli.json => print_json(serde_json::json!({ "snapshot": text }))?,
                None => println!("{}", text),
            }
        }

        Commands::Import { learner, path } => {
            let text = std::fs::read_to_string(&path)?;
            let mut profile = snapshot::try_deserialize(&text)?;
            profile.learner_id = learner.clone();
            db.save_profile(&profile)?;

            if cli.json {
                print_json(serde_json::json!({
                    "learner_id": learner,
                    "concepts": profile.knowledge_nodes.len(),
                }))?;
            } else {
                println!(
                    "Imported {} concept(s) for '{}'.",
                    profile.knowledge_nodes.len(),
                    learner
                );
            }
        }
    }

    Ok(())
}

fn parse_outcome(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "correct" | "c" | "right" | "yes" | "y" | "1" => Some(true),
        "incorrect" | "i" | "wrong" | "w" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

fn split_list(s: Option<&str>) -> Vec<String> {
    s.map(|t| {
        t.split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn concept_list(list: &[ConceptMastery]) -> String {
    list.iter()
        .map(|c| format!("{} ({:.2})", c.concept_name, c.mastery))
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

fn describe_event(event: &UpdateEvent) -> String {
    match event {
        UpdateEvent::ConceptEncountered { concept_name, .. } => {
            format!("new concept: {}", concept_name)
        }
        UpdateEvent::MasteryUpdate { previous, current, .. } => {
            format!("mastery {:.2} -> {:.2}", previous, current)
        }
        UpdateEvent::MisconceptionDetected {
            pattern,
            occurrence_count,
            ..
        } => format!("misconception '{}' seen {} times", pattern, occurrence_count),
        UpdateEvent::MisconceptionResolved { pattern, .. } => {
            format!("misconception '{}' resolved", pattern)
        }
        UpdateEvent::ConfidenceUpdate {
            student_confidence,
            calibration,
            ..
        } => format!(
            "self-reported confidence {:.2} ({:?})",
            student_confidence, calibration
        ),
        UpdateEvent::ReviewScheduled {
            interval,
            next_review_date,
            ..
        } => format!(
            "next review in {} day(s) on {}",
            interval,
            next_review_date.format("%Y-%m-%d")
        ),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
