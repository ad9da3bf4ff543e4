use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent},
    terminal,
};
use futures_util::{pin_mut, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use studyjoy::batching::DEFAULT_BATCH_SIZE;
use studyjoy::clients::flexible::{ClientType, FlexibleClient};
use studyjoy::clients::openai::{OpenAIConfig, OpenAIModel};
use studyjoy::config;
use studyjoy::content::{ContentParagraph, ContentStore, QuizScope};
use studyjoy::db::SqliteStore;
use studyjoy::error::SessionError;
use studyjoy::generator::{ErrorEnvelope, GenerateRequest, QuestionGenerator};
use studyjoy::interceptors::file::FileInterceptor;
use studyjoy::orchestrator::{BatchOrchestrator, GenerationEvent, GenerationOutcome, GenerationRun};
use studyjoy::progress::{ProgressStore, PASS_THRESHOLD};
use studyjoy::questions::{UnitKind, OPTION_LETTERS};
use studyjoy::session::{QuizPhase, QuizSession};
use studyjoy::store::{FileSessionStore, SessionStore};

#[derive(Parser)]
#[command(author, version, about = "📚 StudyJoy quiz generator", long_about = None)]
#[command(after_help = "ENVIRONMENT VARIABLES:
    OPENAI_API_KEY     API key for the OpenAI client
    STUDYJOY_DATA_DIR  Database and saved sessions [default: .studyjoy]
    RUST_LOG           Log filter, e.g. studyjoy=debug

EXAMPLES:
    studyjoy ingest --file cell_biology.json
    studyjoy generate --book \"Cell Biology\" --chapter 2 --batch 0
    studyjoy generate --book \"Cell Biology\" --all --transcripts transcripts/
    studyjoy quiz --book \"Cell Biology\" --paragraph 17 --user alice
    studyjoy resume --user alice
    studyjoy stats --user alice --book \"Cell Biology\"")]
struct Args {
    /// SQLite database path [default: $STUDYJOY_DATA_DIR/studyjoy.db]
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load paragraphs from a JSON file into the content database
    Ingest {
        /// JSON array of paragraph objects
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Generate a batch of questions and print the response envelope
    Generate {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Zero-based batch index
        #[arg(long, default_value_t = 0)]
        batch: usize,

        /// Run every batch sequentially instead of a single one
        #[arg(long)]
        all: bool,

        #[command(flatten)]
        opts: GenArgs,
    },
    /// Generate questions for a scope and answer them in the terminal
    Quiz {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Record the result for this user id
        #[arg(short, long)]
        user: Option<String>,

        /// Ignore any saved session for this scope
        #[arg(long)]
        fresh: bool,

        #[command(flatten)]
        opts: GenArgs,
    },
    /// Pick up the most recent unfinished quiz
    Resume {
        /// Record the result for this user id
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Show recorded results and paragraph progress
    Stats {
        /// User id to report on
        #[arg(short, long)]
        user: String,

        /// Also list paragraph progress for this book
        #[arg(long)]
        book: Option<String>,
    },
}

#[derive(clap::Args)]
struct ScopeArgs {
    /// Book title
    #[arg(short, long)]
    book: String,

    /// Chapter number within the book
    #[arg(short, long)]
    chapter: Option<i64>,

    /// Paragraph id
    #[arg(short, long)]
    paragraph: Option<i64>,
}

impl ScopeArgs {
    fn scope(&self) -> QuizScope {
        match (self.chapter, self.paragraph) {
            (chapter, Some(paragraph)) => QuizScope::paragraph(&self.book, chapter, paragraph),
            (Some(chapter), None) => QuizScope::chapter(&self.book, chapter),
            (None, None) => QuizScope::book(&self.book),
        }
    }
}

#[derive(clap::Args)]
struct GenArgs {
    /// Question source: terms or objectives [default: auto-detect]
    #[arg(long, value_enum)]
    kind: Option<KindArg>,

    /// Units per model call
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Questions requested per term or objective
    #[arg(long, default_value_t = 2)]
    questions_per_unit: usize,

    /// Client backend: openai or mock [default: auto-detect]
    #[arg(long)]
    client: Option<String>,

    /// OpenAI model id (implies the openai client)
    #[arg(long)]
    model: Option<String>,

    /// Save prompt/response transcripts into this directory
    #[arg(long)]
    transcripts: Option<PathBuf>,

    /// Include prompt/reply sizes in the response envelope
    #[arg(long)]
    debug: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    /// Quiz on **marked** terms in the content
    Terms,
    /// Quiz on the paragraph's learning objectives
    Objectives,
}

impl From<KindArg> for UnitKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Terms => UnitKind::MarkedTerms,
            KindArg::Objectives => UnitKind::Objectives,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let args = Args::parse();
    let db_path = args.db.clone().unwrap_or_else(config::database_path);

    match args.command {
        Command::Ingest { file } => ingest(&db_path, &file),
        Command::Generate { scope, batch, all, opts } => generate(&db_path, scope, batch, all, opts).await,
        Command::Quiz { scope, user, fresh, opts } => quiz(&db_path, scope, user, fresh, opts).await,
        Command::Resume { user } => resume(&db_path, user),
        Command::Stats { user, book } => stats(&db_path, &user, book.as_deref()),
    }
}

fn ingest(db_path: &Path, file: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let paragraphs: Vec<ContentParagraph> =
        serde_json::from_str(&raw).context("content file is not a JSON array of paragraphs")?;

    let store = SqliteStore::open(db_path)?;
    let count = store.insert_paragraphs(&paragraphs)?;
    println!("✅ Ingested {} paragraphs into {}", count, db_path.display());
    for title in store.book_titles()? {
        println!("   📖 {}", title);
    }
    Ok(())
}

async fn generate(
    db_path: &Path,
    scope_args: ScopeArgs,
    batch: usize,
    all: bool,
    opts: GenArgs,
) -> anyhow::Result<()> {
    let store = Arc::new(SqliteStore::open(db_path)?);
    let scope = scope_args.scope();
    let kind = pick_kind(opts.kind, &store, &scope)?;
    let generator = build_generator(&opts, store.clone())?;

    if all {
        let mut orchestrator = BatchOrchestrator::new(generator);
        let run = GenerationRun {
            scope,
            unit_kind: kind,
            batch_size: opts.batch_size,
            questions_per_unit: opts.questions_per_unit,
        };
        let outcome = run_with_progress(&mut orchestrator, run).await;
        let body = serde_json::json!({
            "success": outcome.is_complete(),
            "questions": outcome.questions,
            "completedBatches": outcome.completed_batches,
            "error": outcome.error,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        if !outcome.is_complete() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut request = GenerateRequest::for_scope(&scope, batch);
    request.batch_size = opts.batch_size;
    request.questions_per_unit = opts.questions_per_unit;

    match generator.generate(&request, kind).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(e) => {
            let (status, envelope) = ErrorEnvelope::from_error(&e);
            eprintln!("❌ Generation failed (status {})", status);
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            std::process::exit(1);
        }
    }
}

async fn quiz(
    db_path: &Path,
    scope_args: ScopeArgs,
    user: Option<String>,
    fresh: bool,
    opts: GenArgs,
) -> anyhow::Result<()> {
    let store = Arc::new(SqliteStore::open(db_path)?);
    let scope = scope_args.scope();

    let resumed = if fresh {
        None
    } else {
        QuizSession::resume(open_sessions()?, &scope)?.filter(|s| !s.is_complete())
    };

    let mut session = match resumed {
        Some(session) => {
            println!(
                "📂 Resuming saved session for {} (question {} of {})",
                scope,
                position(&session),
                session.questions().len()
            );
            session
        }
        None => {
            let generator = build_generator(&opts, store.clone())?;
            let mut orchestrator = BatchOrchestrator::new(generator);
            let run = GenerationRun {
                scope: scope.clone(),
                unit_kind: pick_kind(opts.kind, &store, &scope)?,
                batch_size: opts.batch_size,
                questions_per_unit: opts.questions_per_unit,
            };
            let outcome = run_with_progress(&mut orchestrator, run).await;

            if let Some(error) = &outcome.error {
                if outcome.questions.is_empty() {
                    anyhow::bail!("generation failed: {}", error);
                }
                eprintln!(
                    "⚠️  Generation stopped early ({}); quizzing on the {} questions so far",
                    error,
                    outcome.questions.len()
                );
            }
            if outcome.questions.is_empty() {
                println!("💡 No quizzable units in this scope; nothing to do.");
                return Ok(());
            }

            let mut session = QuizSession::new(open_sessions()?, scope.clone());
            session.install_questions(outcome.questions)?;
            session
        }
    };

    run_quiz_loop(&mut session)?;
    finish(&session, &store, user.as_deref())
}

fn resume(db_path: &Path, user: Option<String>) -> anyhow::Result<()> {
    let Some(mut session) = QuizSession::resume_last(open_sessions()?)? else {
        println!("💡 No saved session to resume.");
        return Ok(());
    };
    if session.is_complete() {
        println!(
            "💡 The last session is already complete ({}/{}).",
            session.score(),
            session.questions().len()
        );
        return Ok(());
    }

    println!(
        "📂 Resuming {} (question {} of {})",
        session.scope(),
        position(&session),
        session.questions().len()
    );
    run_quiz_loop(&mut session)?;

    let store = SqliteStore::open(db_path)?;
    finish(&session, &store, user.as_deref())
}

fn stats(db_path: &Path, user: &str, book: Option<&str>) -> anyhow::Result<()> {
    let store = SqliteStore::open(db_path)?;

    match store.user_stats(user)? {
        Some(s) => println!(
            "📊 {}: {} quizzes, {}/{} correct, {:.1}% average",
            s.user_id, s.total_quizzes, s.total_score, s.total_questions, s.average_percentage
        ),
        None => {
            println!("💡 No recorded quizzes for {}.", user);
            return Ok(());
        }
    }

    let recent = store.results_for_user(user)?;
    println!("\nRecent quizzes:");
    for result in recent.iter().take(10) {
        let scope = QuizScope {
            book_id: result.book_id.clone(),
            chapter_id: result.chapter_id,
            paragraph_id: result.paragraph_id,
        };
        println!(
            "   {}  {}/{} ({:.0}%)  {}",
            result.created_at.format("%Y-%m-%d %H:%M"),
            result.score,
            result.total_questions,
            result.percentage,
            scope
        );
    }

    if let Some(book_id) = book {
        let rows = store.progress_for_book(user, book_id)?;
        if rows.is_empty() {
            println!("\n💡 No paragraph progress for {} yet.", book_id);
        } else {
            println!("\nParagraph progress for {}:", book_id);
            for p in rows {
                let mark = if p.completed { "✅" } else { "⬜" };
                println!(
                    "   {} chapter {} paragraph {}  last attempt {:.0}%",
                    mark, p.chapter_id, p.paragraph_id, p.percentage
                );
            }
        }
    }
    Ok(())
}

fn open_sessions() -> anyhow::Result<FileSessionStore> {
    Ok(FileSessionStore::open(config::data_dir().join("sessions"))?)
}

fn build_generator(
    opts: &GenArgs,
    content: Arc<SqliteStore>,
) -> anyhow::Result<QuestionGenerator<FlexibleClient>> {
    let client = match (&opts.client, &opts.model) {
        (_, Some(model)) => FlexibleClient::openai(OpenAIConfig {
            model: OpenAIModel::parse(model),
            ..OpenAIConfig::default()
        }),
        (Some(name), None) => {
            FlexibleClient::new_lazy(ClientType::from_str(name).map_err(anyhow::Error::msg)?)
        }
        (None, None) => FlexibleClient::new_lazy(ClientType::default()),
    };

    let content: Arc<dyn ContentStore> = content;
    let mut generator = QuestionGenerator::new(client, content).with_debug(opts.debug);
    if let Some(dir) = &opts.transcripts {
        generator = generator.with_interceptor(Arc::new(FileInterceptor::new(dir.clone())));
    }
    Ok(generator)
}

/// Explicit --kind wins; otherwise a paragraph with objectives is quizzed on
/// objectives and everything else on marked terms.
fn pick_kind(
    explicit: Option<KindArg>,
    store: &SqliteStore,
    scope: &QuizScope,
) -> anyhow::Result<UnitKind> {
    if let Some(kind) = explicit {
        return Ok(kind.into());
    }
    if let Some(paragraph_id) = scope.paragraph_id {
        let has_objectives = store
            .paragraph(paragraph_id)?
            .and_then(|p| p.objectives)
            .map_or(false, |o| !o.trim().is_empty());
        if has_objectives {
            return Ok(UnitKind::Objectives);
        }
    }
    Ok(UnitKind::MarkedTerms)
}

async fn run_with_progress(
    orchestrator: &mut BatchOrchestrator<FlexibleClient>,
    run: GenerationRun,
) -> GenerationOutcome {
    let mut completed_batches = 0usize;
    let mut error = None;

    {
        let events = orchestrator.stream(run);
        pin_mut!(events);
        while let Some(event) = events.next().await {
            match event {
                GenerationEvent::Progress { progress } => eprintln!(
                    "⏳ batch {}/{} ({}% of units)",
                    progress.current_batch + 1,
                    progress.total_batches,
                    progress.percent_complete()
                ),
                GenerationEvent::BatchCompleted { questions, .. } => {
                    completed_batches += 1;
                    eprintln!("   📦 {} questions", questions.len());
                }
                GenerationEvent::Completed { total_questions } => {
                    eprintln!("✅ Generated {} questions", total_questions)
                }
                GenerationEvent::Failed { error: e } => {
                    eprintln!("❌ {}", e);
                    error = Some(e);
                }
            }
        }
    }

    GenerationOutcome {
        questions: orchestrator.questions().to_vec(),
        completed_batches,
        error,
    }
}

fn run_quiz_loop<S: SessionStore>(session: &mut QuizSession<S>) -> anyhow::Result<()> {
    loop {
        match session.phase().clone() {
            QuizPhase::NoQuestions => {
                println!("💡 No questions loaded.");
                return Ok(());
            }
            QuizPhase::Complete => return Ok(()),
            QuizPhase::Answering { index } => {
                render_question(session, index);
                match read_key()? {
                    KeyCode::Char(c @ ('a'..='d' | 'A'..='D')) => {
                        session.select_answer(c.to_ascii_uppercase() as usize - 'A' as usize)?;
                    }
                    KeyCode::Char(c @ '1'..='4') => {
                        session.select_answer(c as usize - '1' as usize)?;
                    }
                    KeyCode::Enter => match session.submit_answer() {
                        Ok(_) => {}
                        Err(SessionError::NoAnswerSelected) => {
                            println!("💡 Pick an option first (A-D).")
                        }
                        Err(e) => return Err(e.into()),
                    },
                    KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                        println!("\n💾 Session saved. Run `studyjoy resume` to pick it back up.");
                        return Ok(());
                    }
                    _ => {}
                }
            }
            QuizPhase::Submitted { index } => {
                render_verdict(session, index);
                loop {
                    match read_key()? {
                        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                            println!("\n💾 Session saved. Run `studyjoy resume` to pick it back up.");
                            return Ok(());
                        }
                        KeyCode::Enter | KeyCode::Char(' ') => break,
                        _ => continue,
                    }
                }
                session.next_question()?;
            }
        }
    }
}

fn render_question<S: SessionStore>(session: &QuizSession<S>, index: usize) {
    let Some(question) = session.questions().get(index) else {
        return;
    };
    println!(
        "\n🧠 Question {} of {} (score so far: {})",
        index + 1,
        session.questions().len(),
        session.score()
    );
    println!("{}\n", question.question);
    for (i, option) in question.options.iter().enumerate() {
        let marker = if session.selected_answer() == Some(i) { '>' } else { ' ' };
        println!(" {} {}) {}", marker, OPTION_LETTERS[i], option);
    }
    println!("\n   Press A-D to choose, then Enter to submit. Q quits.");
}

fn render_verdict<S: SessionStore>(session: &QuizSession<S>, index: usize) {
    let Some(question) = session.questions().get(index) else {
        return;
    };
    match session.selected_answer() {
        Some(selected) if selected == question.correct_answer_index => println!("\n✅ Correct!"),
        Some(selected) => println!(
            "\n❌ Not quite. You picked {}, the answer is {}.",
            OPTION_LETTERS[selected],
            question.correct_letter()
        ),
        None => println!("\n❌ The answer is {}.", question.correct_letter()),
    }
    println!("   {}", question.explanation);
    println!("\n   Enter for the next question. Q quits.");
}

fn finish<S: SessionStore>(
    session: &QuizSession<S>,
    progress: &SqliteStore,
    user: Option<&str>,
) -> anyhow::Result<()> {
    if !session.is_complete() {
        return Ok(());
    }

    let total = session.questions().len();
    println!(
        "\n🎯 Quiz complete: {}/{} ({:.0}%)",
        session.score(),
        total,
        session.percentage()
    );
    if session.percentage() >= PASS_THRESHOLD {
        println!("🏅 Passed (threshold {:.0}%)", PASS_THRESHOLD);
    } else {
        println!("📚 Below the {:.0}% pass mark. Try this one again.", PASS_THRESHOLD);
    }

    match user {
        Some(user_id) => {
            let record = session
                .completion_record(user_id)
                .context("completed session has no completion record")?;
            let outcome = progress.record_completion(&record)?;
            println!("💾 Recorded for {} (result #{})", user_id, outcome.result.id);
            if let Some(p) = outcome.progress {
                if p.completed {
                    println!("   Paragraph {} marked complete.", p.paragraph_id);
                }
            }
        }
        None => eprintln!("⚠️  No --user given; this result was not recorded."),
    }
    Ok(())
}

fn position<S: SessionStore>(session: &QuizSession<S>) -> usize {
    match session.phase() {
        QuizPhase::Answering { index } | QuizPhase::Submitted { index } => index + 1,
        QuizPhase::Complete => session.questions().len(),
        QuizPhase::NoQuestions => 0,
    }
}

/// One keystroke in raw mode; the terminal is restored before returning.
fn read_key() -> anyhow::Result<KeyCode> {
    terminal::enable_raw_mode()?;
    let result = loop {
        match event::read() {
            Ok(Event::Key(KeyEvent { code, .. })) => break Ok(code),
            Ok(_) => continue,
            Err(e) => break Err(e),
        }
    };
    terminal::disable_raw_mode()?;
    Ok(result?)
}
