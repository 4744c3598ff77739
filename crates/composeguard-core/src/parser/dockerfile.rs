/// A logical Dockerfile instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerInstruction {
    /// Upper-cased keyword (`FROM`, `ENV`, ...).
    pub instruction: String,
    pub arguments: String,
    /// 1-based line where the instruction starts.
    pub line_number: usize,
}

impl DockerInstruction {
    /// `KEY=VALUE` assignments of an `ENV` or `ARG` instruction.
    ///
    /// Handles the legacy `ENV KEY value` form and strips matching quotes.
    /// Keys declared without a value (`ARG TOKEN`) yield `None`.
    pub fn assignments(&self) -> Vec<(String, Option<String>)> {
        let args = self.arguments.trim();
        if args.is_empty() {
            return Vec::new();
        }

        if self.instruction == "ENV" && !first_word(args).contains('=') {
            return match args.split_once(char::is_whitespace) {
                Some((key, value)) => vec![(key.to_string(), Some(unquote(value.trim()).to_string()))],
                None => vec![(args.to_string(), None)],
            };
        }

        split_words(args)
            .into_iter()
            .map(|word| match word.split_once('=') {
                Some((key, value)) => (key.to_string(), Some(unquote(value).to_string())),
                None => (word, None),
            })
            .collect()
    }

    /// Source paths of a `COPY`/`ADD` instruction, flags removed.
    pub fn copy_sources(&self) -> Vec<String> {
        let args = self.arguments.trim();
        let words: Vec<String> = if args.starts_with('[') {
            args.trim_matches(|c| c == '[' || c == ']')
                .split(',')
                .map(|w| unquote(w.trim()).to_string())
                .filter(|w| !w.is_empty())
                .collect()
        } else {
            split_words(args)
                .into_iter()
                .filter(|w| !w.starts_with("--"))
                .collect()
        };

        match words.split_last() {
            Some((_dest, sources)) => sources.to_vec(),
            None => Vec::new(),
        }
    }
}

/// Split Dockerfile text into instructions, joining `\` continuations and
/// skipping comments and blank lines.
pub fn parse_dockerfile(content: &str) -> Vec<DockerInstruction> {
    let mut instructions = Vec::new();
    let mut continuation = String::new();
    let mut line_start = 0;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();

        if trimmed.starts_with('#') || trimmed.is_empty() {
            continue;
        }

        if continuation.is_empty() {
            line_start = i + 1;
        }

        if let Some(stripped) = trimmed.strip_suffix('\\') {
            continuation.push_str(stripped);
            continuation.push(' ');
            continue;
        }

        let full_line = if continuation.is_empty() {
            trimmed.to_string()
        } else {
            continuation.push_str(trimmed);
            std::mem::take(&mut continuation)
        };

        instructions.push(split_instruction(&full_line, line_start));
    }

    // Dangling continuation at EOF
    if !continuation.is_empty() {
        instructions.push(split_instruction(continuation.trim(), line_start));
    }

    instructions
}

fn split_instruction(line: &str, line_number: usize) -> DockerInstruction {
    match line.split_once(char::is_whitespace) {
        Some((instr, args)) => DockerInstruction {
            instruction: instr.to_uppercase(),
            arguments: args.trim().to_string(),
            line_number,
        },
        None => DockerInstruction {
            instruction: line.to_uppercase(),
            arguments: String::new(),
            line_number,
        },
    }
}

fn first_word(s: &str) -> &str {
    s.split_whitespace().next().unwrap_or("")
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Whitespace split that keeps quoted sections together.
fn split_words(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in s.chars() {
        match quote {
            Some(q) if c == q => {
                quote = None;
                current.push(c);
            }
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                current.push(c);
            }
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}
