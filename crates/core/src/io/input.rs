use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

/// Words that end the conversation politely.
const FAREWELLS: &[&str] = &["bye", "exit", "quit", "goodbye"];

/// One read from the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Line(String),
    Interrupted,
    Eof,
    Error(String),
}

pub type LineSender = mpsc::UnboundedSender<InputEvent>;
pub type LineReceiver = mpsc::UnboundedReceiver<InputEvent>;
/// Readiness signal: the input thread only prompts after receiving one.
pub type PromptReady = std::sync::mpsc::Sender<()>;

pub fn is_farewell(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    FAREWELLS.contains(&lower.as_str())
}

/// Ask the input thread to show the next prompt.
pub fn request_next_prompt(ready_tx: &PromptReady) {
    let _ = ready_tx.send(());
}

/// Run the line editor on its own OS thread; rustyline blocks.
/// Returns the event receiver and the prompt-readiness sender.
pub fn spawn_input_thread(prompt: &str) -> (LineReceiver, PromptReady) {
    let (line_tx, line_rx) = mpsc::unbounded_channel::<InputEvent>();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
    let prompt = prompt.to_owned();

    std::thread::spawn(move || {
        let mut editor = match rustyline::DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                let _ = line_tx.send(InputEvent::Error(e.to_string()));
                return;
            }
        };

        while ready_rx.recv().is_ok() {
            let event = match editor.readline(&prompt) {
                Ok(line) => {
                    let _ = editor.add_history_entry(line.as_str());
                    InputEvent::Line(line)
                }
                Err(ReadlineError::Interrupted) => InputEvent::Interrupted,
                Err(ReadlineError::Eof) => InputEvent::Eof,
                Err(e) => InputEvent::Error(e.to_string()),
            };
            let last = !matches!(event, InputEvent::Line(_));
            if line_tx.send(event).is_err() || last {
                break;
            }
        }
    });

    (line_rx, ready_tx)
}
