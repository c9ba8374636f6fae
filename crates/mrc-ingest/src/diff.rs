//! Events from a unified diff of two sorted exports.
//!
//! Input is `diff -u old.csv new.csv` over `uid,email` rows. Within each hunk:
//!
//! | lines for one uid   | event                                  |
//! |---------------------|----------------------------------------|
//! | `+` only            | CREATE with the new email, locale `en` |
//! | `-` and `+`         | UPDATE with the new email              |
//! | `-` only            | DELETE with the old email              |
//! | context (` `)       | nothing                                |
//!
//! A hunk is complete at the next `@@` header or at end of input; its events
//! come out as creates, then updates, then deletes, each in key order.
//! File headers (`---`/`+++`) and `\ No newline` markers are skipped. Any
//! other leading character is a malformed input and ends the stream.

use std::collections::{BTreeMap, VecDeque};
use std::io::BufRead;

use chrono::{DateTime, Utc};
use mrc_reconcile::{is_valid_key, Event, EventKind, Record, Source};

use crate::EventLineError;

const DEFAULT_LOCALE: &str = "en";

#[derive(Default)]
struct Hunk {
    remove: BTreeMap<String, Option<String>>,
    create: BTreeMap<String, Option<String>>,
    update: BTreeMap<String, Option<String>>,
}

impl Hunk {
    fn removed(&mut self, uid: String, email: Option<String>) {
        // `+` before `-` for the same uid is still an email change.
        match self.create.remove(&uid) {
            Some(new_email) => {
                self.update.insert(uid, new_email);
            }
            None => {
                self.remove.insert(uid, email);
            }
        }
    }

    fn added(&mut self, uid: String, email: Option<String>) {
        if self.remove.remove(&uid).is_some() {
            self.update.insert(uid, email);
        } else {
            self.create.insert(uid, email);
        }
    }
}

pub struct DiffEventReader<R> {
    inner: R,
    separator: char,
    timestamp: DateTime<Utc>,
    line_no: u64,
    buf: String,
    /// `None` until the first `@@` header.
    hunk: Option<Hunk>,
    ready: VecDeque<Result<Event, EventLineError>>,
    done: bool,
}

impl<R: BufRead> DiffEventReader<R> {
    /// Every produced event is stamped with `timestamp`.
    pub fn new(inner: R, separator: char, timestamp: DateTime<Utc>) -> Self {
        Self {
            inner,
            separator,
            timestamp,
            line_no: 0,
            buf: String::new(),
            hunk: None,
            ready: VecDeque::new(),
            done: false,
        }
    }

    fn event(&self, kind: EventKind, uid: String, email: Option<String>) -> Event {
        let mut record = Record::new(uid, Source::Primary);
        if let Some(email) = email {
            record = record.with_field("email", email);
        }
        if kind == EventKind::Create {
            record = record.with_field("locale", DEFAULT_LOCALE);
        }
        Event::new(kind, record, self.timestamp)
    }

    fn close_hunk(&mut self) {
        let Some(hunk) = self.hunk.take() else {
            return;
        };
        for (uid, email) in hunk.create {
            let ev = self.event(EventKind::Create, uid, email);
            self.ready.push_back(Ok(ev));
        }
        for (uid, email) in hunk.update {
            let ev = self.event(EventKind::Update, uid, email);
            self.ready.push_back(Ok(ev));
        }
        for (uid, email) in hunk.remove {
            let ev = self.event(EventKind::Delete, uid, email);
            self.ready.push_back(Ok(ev));
        }
    }

    fn malformed(&mut self, message: String) {
        self.ready.clear();
        self.ready.push_back(Err(EventLineError::Malformed {
            line_no: self.line_no,
            message,
        }));
        self.hunk = None;
        self.done = true;
    }

    fn process_line(&mut self) {
        let line = self.buf.trim_end_matches(['\r', '\n']).to_string();
        if line.len() >= 3 && line.chars().take(3).all(|c| c == '-' || c == '+') {
            return;
        }
        if line.starts_with('@') {
            self.close_hunk();
            self.hunk = Some(Hunk::default());
            return;
        }
        let line_no = self.line_no;
        let separator = self.separator;
        let Some(hunk) = self.hunk.as_mut() else {
            // Preamble before the first hunk (`diff` command line, `Only in`).
            return;
        };

        let mut chars = line.chars();
        let sign = match chars.next() {
            None => return,
            Some(c) => c,
        };
        match sign {
            ' ' | '\\' => {}
            '-' | '+' => {
                let mut tokens = chars.as_str().split(separator).map(str::trim);
                let uid = tokens.next().unwrap_or("").to_string();
                let email = tokens.next().filter(|e| !e.is_empty()).map(str::to_string);
                if !is_valid_key(&uid) {
                    self.ready.push_back(Err(EventLineError::Decode {
                        line_no,
                        message: format!("invalid uid {:?}", uid),
                    }));
                    return;
                }
                if sign == '-' {
                    hunk.removed(uid, email);
                } else {
                    hunk.added(uid, email);
                }
            }
            other => self.malformed(format!("unexpected character at start of line: {:?}", other)),
        }
    }
}

impl<R: BufRead> Iterator for DiffEventReader<R> {
    type Item = Result<Event, EventLineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Some(item);
            }
            if self.done {
                return None;
            }
            self.buf.clear();
            match self.inner.read_line(&mut self.buf) {
                Ok(0) => {
                    self.close_hunk();
                    self.done = true;
                }
                Ok(_) => {
                    self.line_no += 1;
                    self.process_line();
                }
                Err(e) => {
                    self.done = true;
                    self.hunk = None;
                    return Some(Err(EventLineError::Io(e.to_string())));
                }
            }
        }
    }
}
