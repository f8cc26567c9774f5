//! Line-oriented interactive shell.
//!
//! Reads commands from any async reader and writes plain text to any async
//! writer, so the whole loop can be driven from tests. Ctrl-C reaches the
//! shell through a shared [`Notify`]: it cancels a running search, and
//! anywhere else it quits.

use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::PostCache;
use crate::constants::{COURSE_PAGE_SIZE, QUESTION_LIST_LIMIT};
use crate::courses::sort_by_term;
use crate::fetcher::FetchInterruption;
use crate::forum::{Course, ForumClient, Post};
use crate::search::{Degradation, QueryEngine, SearchMode, SearchOutcome};
use crate::thread::{RenderLine, ThreadFlattener, WindowedViewport};

const HELP: &str = "\
Commands:
  courses [page]               list your courses
  list <course#>               show the latest questions of a course
  search <course#> <query>     search a course
  show <course#> <post nr>     open a post
  refresh <course#>            drop cached posts of a course
  help                         show this help
  quit                         exit (or Ctrl-C at a prompt)
Inside a post: j/down, k/up, r <text> to reply, b to go back
Ctrl-C during a search stops it";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}', type 'help'")]
    Unknown(String),
    #[error("missing {0}")]
    MissingArgument(&'static str),
    #[error("'{0}' is not a number")]
    InvalidNumber(String),
}

/// A top-level shell command. Course numbers and pages are 1-based as displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Courses(usize),
    List(usize),
    Search { course: usize, query: String },
    Show { course: usize, nr: u64 },
    Refresh(usize),
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown commands or bad arguments.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(w, r)| (w, r.trim()));

        let command = match word.to_lowercase().as_str() {
            "" => return Ok(None),
            "courses" | "c" => match rest.split_whitespace().next() {
                Some(page) => Self::Courses(parse_number(page)?),
                None => Self::Courses(1),
            },
            "list" | "l" => Self::List(parse_number(first_arg(rest, "course number")?)?),
            "search" | "s" => {
                let (course, query) = rest
                    .split_once(char::is_whitespace)
                    .ok_or(CommandError::MissingArgument("search query"))?;
                Self::Search {
                    course: parse_number(course)?,
                    query: query.trim().to_string(),
                }
            }
            "show" | "o" => {
                let mut args = rest.split_whitespace();
                let course = args.next().ok_or(CommandError::MissingArgument("course number"))?;
                let nr = args.next().ok_or(CommandError::MissingArgument("post number"))?;
                Self::Show {
                    course: parse_number(course)?,
                    nr: parse_number(nr.trim_start_matches('@'))?,
                }
            }
            "refresh" => Self::Refresh(parse_number(first_arg(rest, "course number")?)?),
            "help" | "h" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

fn first_arg<'a>(rest: &'a str, what: &'static str) -> Result<&'a str, CommandError> {
    rest.split_whitespace()
        .next()
        .ok_or(CommandError::MissingArgument(what))
}

fn parse_number<T: std::str::FromStr>(value: &str) -> Result<T, CommandError> {
    value
        .parse()
        .map_err(|_| CommandError::InvalidNumber(value.to_string()))
}

/// A key press inside the post view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewCommand {
    Down,
    Up,
    Reply(String),
    Back,
    Unknown,
}

impl ViewCommand {
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line {
            "j" | "down" | "" => Self::Down,
            "k" | "up" => Self::Up,
            "b" | "back" | "q" | "esc" => Self::Back,
            _ => match line.strip_prefix("r ").or_else(|| line.strip_prefix("reply ")) {
                Some(text) if !text.trim().is_empty() => Self::Reply(text.trim().to_string()),
                _ => Self::Unknown,
            },
        }
    }
}

/// What a prompt read produced.
enum Input {
    Line(String),
    Interrupted,
    Closed,
}

/// Forward every Ctrl-C the process receives to `interrupt`.
///
/// Install this once per process. While it runs, Ctrl-C no longer kills the
/// process, so the shell must be listening on `interrupt`.
pub fn forward_ctrl_c(interrupt: Arc<Notify>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Cannot listen for Ctrl-C: {e}");
                break;
            }
            debug!("Ctrl-C received");
            interrupt.notify_one();
        }
    })
}

/// Shell state: the course list plus the services commands run against.
pub struct App {
    client: Arc<dyn ForumClient>,
    cache: Arc<PostCache>,
    engine: QueryEngine,
    flattener: ThreadFlattener,
    window_size: usize,
    courses: Vec<Course>,
    interrupt: Arc<Notify>,
}

impl App {
    #[must_use]
    pub fn new(
        client: Arc<dyn ForumClient>,
        cache: Arc<PostCache>,
        engine: QueryEngine,
        flattener: ThreadFlattener,
        window_size: usize,
    ) -> Self {
        Self {
            client,
            cache,
            engine,
            flattener,
            window_size: window_size.max(1),
            courses: Vec::new(),
            interrupt: Arc::new(Notify::new()),
        }
    }

    /// Handle that delivers a Ctrl-C to this shell. See [`forward_ctrl_c`].
    #[must_use]
    pub fn interrupt_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.interrupt)
    }

    #[must_use]
    pub fn courses(&self) -> &[Course] {
        &self.courses
    }

    /// Fetch and sort the course list.
    ///
    /// # Errors
    ///
    /// Returns an error if the forum cannot list courses.
    pub async fn load_courses(&mut self) -> Result<()> {
        let mut courses = self.client.list_courses().await?;
        sort_by_term(&mut courses);
        debug!(courses = courses.len(), "Loaded courses");
        self.courses = courses;
        Ok(())
    }

    fn course(&self, number: usize) -> Option<&Course> {
        number.checked_sub(1).and_then(|i| self.courses.get(i))
    }

    /// Next input line, or an interrupt if Ctrl-C arrives first.
    async fn next_input<R>(&self, lines: &mut Lines<R>) -> Result<Input>
    where
        R: AsyncBufRead + Unpin,
    {
        tokio::select! {
            line = lines.next_line() => Ok(line?.map_or(Input::Closed, Input::Line)),
            () = self.interrupt.notified() => Ok(Input::Interrupted),
        }
    }

    /// Run the shell until `quit`, Ctrl-C at a prompt, or end of input.
    ///
    /// # Errors
    ///
    /// Returns an error only if reading input or writing output fails.
    pub async fn run<R, W>(&mut self, input: R, mut output: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        self.print_courses(1, &mut output).await?;

        loop {
            write(&mut output, "piazza> ").await?;
            let line = match self.next_input(&mut lines).await? {
                Input::Line(line) => line,
                Input::Interrupted => {
                    writeln(&mut output, "\nInterrupted.").await?;
                    break;
                }
                Input::Closed => break,
            };

            let command = match Command::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    writeln(&mut output, &e.to_string()).await?;
                    continue;
                }
            };

            match command {
                Command::Quit => break,
                Command::Help => writeln(&mut output, HELP).await?,
                Command::Courses(page) => self.print_courses(page, &mut output).await?,
                Command::List(n) => self.list_questions(n, &mut output).await?,
                Command::Search { course, query } => {
                    self.search(course, &query, &mut output).await?;
                }
                Command::Show { course, nr } => {
                    if !self.show_post(course, nr, &mut lines, &mut output).await? {
                        break;
                    }
                }
                Command::Refresh(n) => match self.course(n) {
                    Some(course) => {
                        self.cache.invalidate(course).await;
                        writeln(&mut output, &format!("Cleared cached posts of {}", course.name))
                            .await?;
                    }
                    None => writeln(&mut output, &format!("No course #{n}")).await?,
                },
            }
        }

        writeln(&mut output, "Goodbye!").await?;
        Ok(())
    }

    async fn print_courses<W: AsyncWrite + Unpin>(&self, page: usize, output: &mut W) -> Result<()> {
        if self.courses.is_empty() {
            return writeln(output, "No courses found.").await;
        }
        let pages = self.courses.len().div_ceil(COURSE_PAGE_SIZE);
        if page == 0 || page > pages {
            return writeln(output, &format!("No page {page}, there are {pages}")).await;
        }

        let start = (page - 1) * COURSE_PAGE_SIZE;
        for (i, course) in self
            .courses
            .iter()
            .enumerate()
            .skip(start)
            .take(COURSE_PAGE_SIZE)
        {
            writeln(output, &format!("{:>3}. {}", i + 1, course.label())).await?;
        }
        if pages > 1 {
            writeln(
                output,
                &format!("Page {page} of {pages}, 'courses <page>' for another page"),
            )
            .await?;
        }
        Ok(())
    }

    async fn list_questions<W: AsyncWrite + Unpin>(&self, n: usize, output: &mut W) -> Result<()> {
        let Some(course) = self.course(n) else {
            return writeln(output, &format!("No course #{n}")).await;
        };
        match self.client.get_page(course, QUESTION_LIST_LIMIT, 0).await {
            Ok(posts) if posts.is_empty() => writeln(output, "No posts found.").await,
            Ok(posts) => print_posts(&posts, output).await,
            Err(e) => {
                warn!(course = %course.nid, "Failed to list questions: {e}");
                writeln(output, &format!("Failed to fetch posts: {e}")).await
            }
        }
    }

    async fn search<W: AsyncWrite + Unpin>(
        &self,
        n: usize,
        query: &str,
        output: &mut W,
    ) -> Result<()> {
        let Some(course) = self.course(n) else {
            return writeln(output, &format!("No course #{n}")).await;
        };
        writeln(output, &format!("Searching {} (Ctrl-C to stop)...", course.name)).await?;

        let cancel = CancellationToken::new();
        let search = self.engine.search_cancellable(query, course, &cancel);
        tokio::pin!(search);
        let outcome = tokio::select! {
            outcome = &mut search => outcome,
            () = self.interrupt.notified() => {
                info!(course = %course.nid, "Search interrupted");
                cancel.cancel();
                search.await
            }
        };

        if let Some(notice) = describe(&outcome) {
            writeln(output, &notice).await?;
        }
        if outcome.posts.is_empty() {
            if outcome.mode != SearchMode::Cancelled {
                writeln(output, "No results found.").await?;
            }
            return Ok(());
        }
        print_posts(&outcome.posts, output).await
    }

    /// Show a post and handle its key commands. Returns `false` if the
    /// shell should exit.
    async fn show_post<R, W>(
        &self,
        n: usize,
        nr: u64,
        lines: &mut Lines<R>,
        output: &mut W,
    ) -> Result<bool>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let Some(course) = self.course(n) else {
            writeln(output, &format!("No course #{n}")).await?;
            return Ok(true);
        };
        let tree = match self.client.get_post_tree(course, nr).await {
            Ok(tree) => tree,
            Err(e) => {
                warn!(course = %course.nid, nr, "Failed to fetch post: {e}");
                writeln(output, &format!("Failed to fetch post {nr}: {e}")).await?;
                return Ok(true);
            }
        };

        let thread = self.flattener.flatten(&tree);
        let mut viewport = WindowedViewport::new(self.window_size, thread.len());
        render_window(nr, &thread, &viewport, output).await?;

        loop {
            write(output, "post> ").await?;
            let line = match self.next_input(lines).await? {
                Input::Line(line) => line,
                Input::Interrupted => {
                    writeln(output, "\nInterrupted.").await?;
                    return Ok(false);
                }
                Input::Closed => return Ok(false),
            };
            match ViewCommand::parse(&line) {
                ViewCommand::Down => {
                    if viewport.scroll_down() {
                        render_window(nr, &thread, &viewport, output).await?;
                    }
                }
                ViewCommand::Up => {
                    if viewport.scroll_up() {
                        render_window(nr, &thread, &viewport, output).await?;
                    }
                }
                ViewCommand::Reply(text) => {
                    match self.client.post_reply(course, nr, &text).await {
                        Ok(()) => writeln(output, "Comment posted.").await?,
                        Err(e) => writeln(output, &format!("Failed to post comment: {e}")).await?,
                    }
                    return Ok(true);
                }
                ViewCommand::Back => return Ok(true),
                ViewCommand::Unknown => {
                    writeln(output, "j/k to scroll, r <text> to reply, b to go back").await?;
                }
            }
        }
    }
}

/// One-line notice about how a search was degraded, if it was.
#[must_use]
pub fn describe(outcome: &SearchOutcome) -> Option<String> {
    let mut notes = Vec::new();
    for degradation in &outcome.degradations {
        match degradation {
            Degradation::FetchPartial(FetchInterruption::Failed { offset, error }) => {
                notes.push(format!(
                    "feed stopped at position {offset}, later posts were not searched ({error})"
                ));
            }
            Degradation::FetchPartial(FetchInterruption::Cancelled { offset }) => {
                notes.push(format!("feed stopped at position {offset}"));
            }
            Degradation::EmbeddingUnavailable => notes.push("keyword search".to_string()),
            Degradation::EmbeddingEncodeFailure(_) => {
                notes.push("semantic search failed, used keyword search".to_string());
            }
            Degradation::CacheSizeMismatch => {}
        }
    }
    if outcome.mode == SearchMode::Cancelled {
        notes.push("search cancelled".to_string());
    }
    (!notes.is_empty()).then(|| format!("Note: {}", notes.join("; ")))
}

async fn render_window<W: AsyncWrite + Unpin>(
    nr: u64,
    thread: &[RenderLine],
    viewport: &WindowedViewport,
    output: &mut W,
) -> Result<()> {
    let range = viewport.visible_range();
    writeln(
        output,
        &format!(
            "--- Post {nr} [{}-{} of {}] (j/k scroll, r <text> reply, b back) ---",
            range.start + 1,
            range.end,
            viewport.total_lines()
        ),
    )
    .await?;
    for line in &thread[range] {
        writeln(output, &line.to_string()).await?;
    }
    Ok(())
}

async fn print_posts<W: AsyncWrite + Unpin>(posts: &[Post], output: &mut W) -> Result<()> {
    for post in posts {
        writeln(output, &post.label()).await?;
    }
    Ok(())
}

async fn write<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> Result<()> {
    output.write_all(text.as_bytes()).await?;
    output.flush().await?;
    Ok(())
}

async fn writeln<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> Result<()> {
    output.write_all(text.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}
