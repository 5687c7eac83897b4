use crate::traits::Interface;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};
use tokio::sync::Mutex;

pub struct TerminalInterface {
    reader: Mutex<BufReader<Stdin>>,
    prompt: String,
}

impl TerminalInterface {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            reader: Mutex::new(BufReader::new(tokio::io::stdin())),
            prompt: prompt.into(),
        }
    }

    async fn write(&self, text: &str) {
        let mut stdout = tokio::io::stdout();
        let _ = stdout.write_all(text.as_bytes()).await;
        let _ = stdout.flush().await;
    }
}

impl Default for TerminalInterface {
    fn default() -> Self {
        Self::new("rogue> ")
    }
}

#[async_trait]
impl Interface for TerminalInterface {
    async fn receive_input(&self) -> Option<String> {
        self.write(&self.prompt).await;

        let mut line = String::new();
        match self.reader.lock().await.read_line(&mut line).await {
            Ok(0) => None, // EOF
            Ok(_) => Some(line.trim().to_string()),
            Err(_) => None,
        }
    }

    async fn send_output(&self, message: &str) {
        self.write(&format!("{}\n", message)).await;
    }

    async fn confirm(&self, question: &str) -> bool {
        self.send_output(&format!("⚠️  {}", question)).await;
        self.write("Confirm? (y/n): ").await;

        let mut line = String::new();
        match self.reader.lock().await.read_line(&mut line).await {
            Ok(n) if n > 0 => line.trim().to_lowercase().starts_with('y'),
            _ => false,
        }
    }

    async fn show_status(&self, status: &str) {
        self.send_output(&format!("ℹ️  {}", status)).await;
    }
}
