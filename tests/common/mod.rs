//! Shared fixtures for the integration tests: an on-disk data directory
//! and a scripted transport that records every request it sees.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use flowline::{Config, IndexMap, Request, Response, Result, Transport};
use tempfile::TempDir;

/// Shared view of the requests a [`MockTransport`] has sent.
pub type RequestLog = Rc<RefCell<Vec<Request>>>;

/// Transport that replays scripted responses in order, repeating the last
/// one once the script runs out.
pub struct MockTransport {
    script: RefCell<VecDeque<Response>>,
    log: RequestLog,
}

impl MockTransport {
    pub fn scripted(responses: Vec<Response>) -> (Box<dyn Transport>, RequestLog) {
        let log: RequestLog = Rc::new(RefCell::new(Vec::new()));
        let transport = MockTransport {
            script: RefCell::new(responses.into()),
            log: log.clone(),
        };
        (Box::new(transport), log)
    }

    pub fn returning(response: Response) -> (Box<dyn Transport>, RequestLog) {
        Self::scripted(vec![response])
    }
}

impl Transport for MockTransport {
    fn send(&self, request: &Request) -> Result<Response> {
        self.log.borrow_mut().push(request.clone());
        let mut script = self.script.borrow_mut();
        let response = if script.len() > 1 {
            script.pop_front().expect("scripted response")
        } else {
            script
                .front()
                .cloned()
                .unwrap_or_else(|| json_ok("{}"))
        };
        Ok(response)
    }
}

pub fn json_ok(body: &str) -> Response {
    response(200, body)
}

pub fn plain_ok(body: &str) -> Response {
    response(200, body)
}

pub fn response(status: u16, body: &str) -> Response {
    Response {
        status,
        headers: IndexMap::new(),
        body: body.to_string(),
    }
}

/// Temporary data directory with `flows/`, `profiles/` and `templates/`.
pub struct DataDir {
    root: TempDir,
}

impl DataDir {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        for sub in ["flows", "profiles", "templates"] {
            std::fs::create_dir(root.path().join(sub)).expect("data subdirectory");
        }
        Self { root }
    }

    pub fn flow(&self, name: &str, yaml: &str) -> &Self {
        self.write("flows", &format!("{name}.yaml"), yaml)
    }

    pub fn profile(&self, name: &str, yaml: &str) -> &Self {
        self.write("profiles", &format!("{name}.yaml"), yaml)
    }

    pub fn template(&self, name: &str, content: &str) -> &Self {
        self.write("templates", name, content)
    }

    fn write(&self, sub: &str, file: &str, content: &str) -> &Self {
        std::fs::write(self.root.path().join(sub).join(file), content).expect("fixture write");
        self
    }

    pub fn config(&self) -> Config {
        Config::new().with_data_path(self.root.path())
    }
}
