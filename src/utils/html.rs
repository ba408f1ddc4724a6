// src/utils/html.rs

use crate::models::question::{CreateQuestionRequest, QuestionOptions, UpdateQuestionRequest};

/// Clean HTML content using the ammonia library.
///
/// Whitelist-based: safe formatting tags survive, `<script>` and friends
/// (with their content) and event-handler attributes are stripped. Question
/// text and options are rendered as HTML by clients, so everything an admin
/// submits passes through here before it is stored.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

fn clean_options(options: QuestionOptions) -> QuestionOptions {
    QuestionOptions {
        a: clean_html(&options.a),
        b: clean_html(&options.b),
        c: clean_html(&options.c),
        d: clean_html(&options.d),
    }
}

pub fn sanitize_create(req: CreateQuestionRequest) -> CreateQuestionRequest {
    CreateQuestionRequest {
        competency: clean_html(&req.competency),
        question_text: clean_html(&req.question_text),
        options: clean_options(req.options),
        ..req
    }
}

pub fn sanitize_update(req: UpdateQuestionRequest) -> UpdateQuestionRequest {
    UpdateQuestionRequest {
        competency: req.competency.as_deref().map(clean_html),
        question_text: req.question_text.as_deref().map(clean_html),
        options: req.options.map(clean_options),
        ..req
    }
}
