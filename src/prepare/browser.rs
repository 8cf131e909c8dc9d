//! The interactive browser session.
//!
//! The session is a suspend/resume loop: it blocks on the next HTTP
//! request, which is the only place it waits for the user. GET renders
//! every unmet requirement; POST applies the submitted choices and then
//! provides unmet requirements in declaration order, stopping at the first
//! one that is still unmet afterwards.

use std::sync::Arc;

use super::engine::Preparation;
use super::http::{HttpRequest, HttpServer, Incoming, SessionHandle};
use super::page::{self, Section};
use super::{BrowserOpener, PrepareResult};
use crate::plugins::RequirementStatus;

/// Message for a session stopped while waiting for input.
pub const STOPPED_MESSAGE: &str = "Browser UI main loop was stopped.";

/// Open the session in the user's browser, or print the URL.
pub fn default_opener(handle: SessionHandle) {
    let url = handle.url().to_string();
    tracing::info!("Opening {} in a browser", url);
    if let Err(e) = open::that(&url) {
        tracing::warn!("Could not open a browser ({}); visit {} to continue", e, url);
    }
}

enum Step {
    Continue,
    Finished(PrepareResult),
}

pub(crate) struct BrowserSession<'p> {
    preparation: Option<Preparation<'p>>,
    keep_going_until_success: bool,
}

impl<'p> BrowserSession<'p> {
    pub fn new(preparation: Preparation<'p>, keep_going_until_success: bool) -> Self {
        Self {
            preparation: Some(preparation),
            keep_going_until_success,
        }
    }

    pub fn run(mut self, opener: BrowserOpener) -> PrepareResult {
        let Some(preparation) = self.preparation.take() else {
            return PrepareResult::failure(vec![STOPPED_MESSAGE.to_string()]);
        };
        let mut server = match HttpServer::bind() {
            Ok(server) => server,
            Err(e) => {
                let statuses = preparation.evaluate();
                return preparation.fail(vec![e.to_string()], statuses);
            }
        };
        self.preparation = Some(preparation);

        let handle = server.handle();
        tracing::info!("Browser session listening on {}", handle.url());
        opener(handle);

        loop {
            let incoming = match server.next() {
                Ok(incoming) => incoming,
                Err(e) => return self.finish_failed(vec![e.to_string()]),
            };
            let request = match incoming {
                Incoming::Request(request) => request,
                Incoming::Stopped => {
                    tracing::info!("Browser session stopped");
                    return self.finish_stopped();
                }
            };
            if let Step::Finished(result) = self.handle(request) {
                return result;
            }
        }
    }

    fn finish_failed(&mut self, errors: Vec<String>) -> PrepareResult {
        match self.preparation.take() {
            Some(preparation) => {
                let statuses = preparation.evaluate();
                preparation.fail(errors, statuses)
            }
            None => PrepareResult::failure(errors),
        }
    }

    /// A stop while waiting for input reports only the stop itself.
    fn finish_stopped(&mut self) -> PrepareResult {
        let errors = vec![STOPPED_MESSAGE.to_string()];
        match self.preparation.take() {
            Some(preparation) => {
                let statuses = preparation.evaluate();
                preparation.abort(errors, statuses)
            }
            None => PrepareResult::failure(errors),
        }
    }

    fn handle(&mut self, request: HttpRequest) -> Step {
        if request.path != "/" {
            request.respond_html(404, "<h1>Not found</h1>");
            return Step::Continue;
        }
        match request.method.as_str() {
            "GET" => self.handle_get(request),
            "POST" => self.handle_post(request),
            _ => {
                request.respond_html(405, "<h1>Method not allowed</h1>");
                Step::Continue
            }
        }
    }

    fn handle_get(&mut self, request: HttpRequest) -> Step {
        let Some(preparation) = self.preparation.take() else {
            request.respond_html(500, "<h1>Session is over</h1>");
            return Step::Continue;
        };
        let statuses = preparation.evaluate();
        if statuses.iter().all(RequirementStatus::has_been_provided) {
            return self.finish_done(preparation, statuses, request);
        }
        request.respond_html(200, &render_unmet(&preparation, &statuses));
        self.preparation = Some(preparation);
        Step::Continue
    }

    fn handle_post(&mut self, request: HttpRequest) -> Step {
        let Some(mut preparation) = self.preparation.take() else {
            request.respond_html(500, "<h1>Session is over</h1>");
            return Step::Continue;
        };

        let groups = page::parse_form(&request.body);
        for (index, status) in preparation.evaluate().iter().enumerate() {
            let Some(provider) = Preparation::default_provider(status) else {
                continue;
            };
            if let Some(values) = groups.get(&page::field_prefix(index, provider.as_ref())) {
                preparation.apply_config(status.requirement(), provider.as_ref(), values);
            }
        }

        let mut provide_failed = false;
        for requirement in preparation.requirements() {
            let status = preparation.evaluate_one(requirement);
            if status.has_been_provided() {
                continue;
            }
            if preparation.provide(&status).is_err()
                || !preparation.evaluate_one(requirement).has_been_provided()
            {
                provide_failed = true;
                break;
            }
        }

        let statuses = preparation.evaluate();
        if statuses.iter().all(RequirementStatus::has_been_provided) {
            return self.finish_done(preparation, statuses, request);
        }
        if provide_failed && !self.keep_going_until_success {
            let name = preparation.project.name().to_string();
            let result = preparation.fail(Vec::new(), statuses);
            request.respond_html(200, &page::render_failed(&name, result.errors()));
            return Step::Finished(result);
        }
        request.respond_html(200, &render_unmet(&preparation, &statuses));
        self.preparation = Some(preparation);
        Step::Continue
    }

    fn finish_done(
        &mut self,
        preparation: Preparation<'p>,
        statuses: Vec<RequirementStatus>,
        request: HttpRequest,
    ) -> Step {
        let name = preparation.project.name().to_string();
        let result = preparation.succeed(statuses);
        let html = if result.is_success() {
            page::render_done(&name, result.statuses())
        } else {
            page::render_failed(&name, result.errors())
        };
        request.respond_html(200, &html);
        Step::Finished(result)
    }
}

fn render_unmet(preparation: &Preparation<'_>, statuses: &[RequirementStatus]) -> String {
    let forms: Vec<_> = statuses
        .iter()
        .enumerate()
        .filter(|(_, status)| !status.has_been_provided())
        .map(|(index, status)| {
            let provider = Preparation::default_provider(status);
            let form = provider.as_ref().and_then(|provider| {
                let requirement = status.requirement();
                let config =
                    provider.read_config(requirement, &preparation.environ, &preparation.local_state);
                provider.config_form(
                    requirement,
                    &preparation.environ,
                    &preparation.local_state,
                    &config,
                )
            });
            (index, status, provider, form)
        })
        .collect();

    let sections: Vec<Section<'_>> = forms
        .iter()
        .map(|(index, status, provider, form)| Section {
            index: *index,
            status,
            provider: provider.as_ref().map(Arc::as_ref),
            form: form.clone(),
        })
        .collect();
    page::render_form(preparation.project.name(), &sections)
}
