//! Request dispatch for the line protocol.
//!
//! Every request line is parsed into a [`Request`], resolved against the
//! fixed operation table and handed to its domain handler. Protocol-shape
//! errors never reach a handler, and handler failures (including panics) are
//! turned into response envelopes here so they never reach the connection.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use serde_json::Value;

use crate::{
    AppState,
    common::Payload,
    error::AppError,
    middleware::log_errors,
    result::ApiResponse,
    routes::{movie, review, user},
};

/// Operations understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Login,
    CreateUser,
    Logout,
    GetOwnProfile,
    EditOwnProfile,
    DeleteOwnAccount,
    ListUsers,
    AdminEditUser,
    AdminDeleteUser,
    CreateMovie,
    EditMovie,
    DeleteMovie,
    ListMovies,
    GetMovieById,
    CreateReview,
    ListUserReviews,
    EditReview,
    DeleteReview,
}

/// Wire names, matched case-sensitively.
const OPERATIONS: &[(&str, Operation)] = &[
    ("LOGIN", Operation::Login),
    ("CREATE_USER", Operation::CreateUser),
    ("LOGOUT", Operation::Logout),
    ("GET_OWN_PROFILE", Operation::GetOwnProfile),
    ("EDIT_OWN_PROFILE", Operation::EditOwnProfile),
    ("DELETE_OWN_ACCOUNT", Operation::DeleteOwnAccount),
    ("LIST_USERS", Operation::ListUsers),
    ("ADMIN_EDIT_USER", Operation::AdminEditUser),
    ("ADMIN_DELETE_USER", Operation::AdminDeleteUser),
    ("CREATE_MOVIE", Operation::CreateMovie),
    ("EDIT_MOVIE", Operation::EditMovie),
    ("DELETE_MOVIE", Operation::DeleteMovie),
    ("LIST_MOVIES", Operation::ListMovies),
    ("GET_MOVIE_BY_ID", Operation::GetMovieById),
    ("CREATE_REVIEW", Operation::CreateReview),
    ("LIST_USER_REVIEWS", Operation::ListUserReviews),
    ("EDIT_REVIEW", Operation::EditReview),
    ("DELETE_REVIEW", Operation::DeleteReview),
];

impl Operation {
    pub fn from_wire(name: &str) -> Option<Self> {
        OPERATIONS
            .iter()
            .find(|(wire, _)| *wire == name)
            .map(|(_, operation)| *operation)
    }

    pub fn as_str(self) -> &'static str {
        OPERATIONS
            .iter()
            .find(|(_, operation)| *operation == self)
            .map_or("UNKNOWN", |(wire, _)| *wire)
    }

    /// A successful response to these operations ends the connection.
    pub fn ends_session(self) -> bool {
        matches!(self, Operation::Logout | Operation::DeleteOwnAccount)
    }
}

/// A parsed request envelope.
#[derive(Debug, Clone)]
pub struct Request {
    pub operation: Operation,
    pub token: Option<String>,
    pub payload: Payload,
}

impl Request {
    /// Parses one protocol line.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Malformed`] when the line is not a JSON object with
    /// a non-empty `operacao` string, and [`AppError::UnknownOperation`] when
    /// the operation is not in the fixed set.
    pub fn parse(line: &str) -> Result<Self, AppError> {
        let value: Value = serde_json::from_str(line)
            .map_err(|_| AppError::Malformed("JSON mal formatado".into()))?;
        let Value::Object(mut payload) = value else {
            return Err(AppError::Malformed(
                "a requisição deve ser um objeto JSON".into(),
            ));
        };

        let name = match payload.remove("operacao") {
            Some(Value::String(name)) if !name.is_empty() => name,
            _ => return Err(AppError::Malformed("campo 'operacao' ausente".into())),
        };
        let operation =
            Operation::from_wire(&name).ok_or(AppError::UnknownOperation(name))?;

        let token = match payload.remove("token") {
            Some(Value::String(token)) => Some(token),
            _ => None,
        };

        Ok(Self {
            operation,
            token,
            payload,
        })
    }
}

/// Outcome of dispatching one line.
#[derive(Debug)]
pub struct Dispatched {
    /// `None` when the line never resolved to a known operation.
    pub operation: Option<Operation>,
    pub response: ApiResponse,
}

pub async fn dispatch(state: &AppState, line: &str) -> Dispatched {
    let request = match Request::parse(line) {
        Ok(request) => request,
        Err(err) => {
            return Dispatched {
                operation: None,
                response: err.into_response(),
            };
        }
    };

    let operation = request.operation;
    let outcome = AssertUnwindSafe(handle(state, &request))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(AppError::Panic(panic_message(panic.as_ref()))));

    let response = match outcome {
        Ok(response) => response,
        Err(err) => {
            log_errors(operation.as_str(), &err);
            err.into_response()
        }
    };

    Dispatched {
        operation: Some(operation),
        response,
    }
}

async fn handle(state: &AppState, request: &Request) -> Result<ApiResponse, AppError> {
    let token = request.token.as_deref();
    let payload = &request.payload;

    match request.operation {
        Operation::Login => user::login(state, payload).await,
        Operation::CreateUser => user::create_user(state, payload).await,
        Operation::Logout => user::logout(state, token).await,
        Operation::GetOwnProfile => user::get_own_profile(state, token).await,
        Operation::EditOwnProfile => user::edit_own_profile(state, token, payload).await,
        Operation::DeleteOwnAccount => user::delete_own_account(state, token).await,
        Operation::ListUsers => user::list_users(state, token).await,
        Operation::AdminEditUser => user::admin_edit_user(state, token, payload).await,
        Operation::AdminDeleteUser => user::admin_delete_user(state, token, payload).await,
        Operation::CreateMovie => movie::create_movie(state, token, payload).await,
        Operation::EditMovie => movie::edit_movie(state, token, payload).await,
        Operation::DeleteMovie => movie::delete_movie(state, token, payload).await,
        Operation::ListMovies => movie::list_movies(state, token).await,
        Operation::GetMovieById => movie::get_movie_by_id(state, token, payload).await,
        Operation::CreateReview => review::create_review(state, token, payload).await,
        Operation::ListUserReviews => review::list_user_reviews(state, token).await,
        Operation::EditReview => review::edit_review(state, token, payload).await,
        Operation::DeleteReview => review::delete_review(state, token, payload).await,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
