/// Interactive prompts for the run's inputs.
///
/// Generic over the reader and writer so the same code drives a terminal in
/// `main` and an in-memory buffer in tests.

use std::io::{BufRead, Write};

use crate::config::{MAX_RADIUS_MILES, validate_radius};
use crate::model::{MeetupError, Result};

pub const API_KEY_HELP: &str =
    "**(You can find your API key for meetup.com at https://secure.meetup.com/meetup_api/key/)";

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Prints `label` and reads one trimmed line. End of input is an error
    /// so a closed stdin cannot spin a re-prompt loop forever.
    pub fn ask(&mut self, label: &str) -> Result<String> {
        write!(self.output, "{}", label)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(MeetupError::Config(format!(
                "input closed while waiting for '{}'",
                label.trim_end_matches([' ', ':'])
            )));
        }
        Ok(line.trim().to_string())
    }

    pub fn say(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{}", message)?;
        Ok(())
    }

    pub fn ask_api_key(&mut self) -> Result<String> {
        self.say(API_KEY_HELP)?;
        self.say("")?;
        self.ask("API key: ")
    }

    pub fn ask_zipcode(&mut self) -> Result<String> {
        loop {
            let zipcode = self.ask("Zipcode to search: ")?;
            if !zipcode.is_empty() {
                return Ok(zipcode);
            }
            self.say("Please enter a zipcode.")?;
        }
    }

    /// Re-prompts until the answer parses and lies within 0.0 - 100.0 miles.
    pub fn ask_radius(&mut self) -> Result<f64> {
        loop {
            let answer = self.ask(&format!(
                "Search radius in miles (0.0 - {:.1}): ",
                MAX_RADIUS_MILES
            ))?;
            match answer.parse::<f64>().map_err(|e| e.to_string()).and_then(|r| {
                validate_radius(r).map_err(|e| e.to_string())
            }) {
                Ok(radius) => return Ok(radius),
                Err(reason) => self.say(&format!("Invalid radius '{}': {}", answer, reason))?,
            }
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}
