//! In-memory transports and token providers for tests.

use super::{RestResponse, RestTransport, SoapTransport, TransportError};
use crate::client::{self, TokenProvider};
use crate::soap::{RetrieveRequest, RetrieveResponse, SoapObject, WriteOperation, WriteResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Always returns the token the fakes expect.
pub(crate) struct StaticToken;

#[async_trait]
impl TokenProvider for StaticToken {
    async fn ensure_fresh_token(&self) -> Result<String, client::Error> {
        Ok("token".to_string())
    }
}

fn unanswered<T>() -> Result<T, TransportError> {
    Err(TransportError::MalformedBody {
        message: "no answer queued".to_string(),
    })
}

/// SOAP transport answering from queues and recording every call.
#[derive(Default)]
pub(crate) struct FakeSoap {
    answers: Mutex<VecDeque<Result<RetrieveResponse, TransportError>>>,
    requests: Mutex<Vec<RetrieveRequest>>,
    write_answers: Mutex<VecDeque<Result<WriteResponse, TransportError>>>,
    writes: Mutex<Vec<(WriteOperation, Vec<SoapObject>)>>,
}

impl FakeSoap {
    pub(crate) fn new(answers: Vec<Result<RetrieveResponse, TransportError>>) -> Arc<Self> {
        Self::with_writes(answers, Vec::new())
    }

    pub(crate) fn with_writes(
        answers: Vec<Result<RetrieveResponse, TransportError>>,
        write_answers: Vec<Result<WriteResponse, TransportError>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            write_answers: Mutex::new(write_answers.into()),
            ..Self::default()
        })
    }

    pub(crate) fn requests(&self) -> Vec<RetrieveRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn writes(&self) -> Vec<(WriteOperation, Vec<SoapObject>)> {
        self.writes.lock().unwrap().clone()
    }

    fn write(
        &self,
        access_token: &str,
        operation: WriteOperation,
        objects: &[SoapObject],
    ) -> Result<WriteResponse, TransportError> {
        assert_eq!(access_token, "token");
        self.writes.lock().unwrap().push((operation, objects.to_vec()));
        self.write_answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(unanswered)
    }
}

#[async_trait]
impl SoapTransport for FakeSoap {
    async fn retrieve(
        &self,
        access_token: &str,
        request: &RetrieveRequest,
    ) -> Result<RetrieveResponse, TransportError> {
        assert_eq!(access_token, "token");
        self.requests.lock().unwrap().push(request.clone());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(unanswered)
    }

    async fn create(
        &self,
        access_token: &str,
        objects: &[SoapObject],
    ) -> Result<WriteResponse, TransportError> {
        self.write(access_token, WriteOperation::Create, objects)
    }

    async fn update(
        &self,
        access_token: &str,
        objects: &[SoapObject],
    ) -> Result<WriteResponse, TransportError> {
        self.write(access_token, WriteOperation::Update, objects)
    }

    async fn delete(
        &self,
        access_token: &str,
        objects: &[SoapObject],
    ) -> Result<WriteResponse, TransportError> {
        self.write(access_token, WriteOperation::Delete, objects)
    }
}

/// REST transport answering from a queue and recording every path.
#[derive(Default)]
pub(crate) struct FakeRest {
    answers: Mutex<VecDeque<Result<RestResponse, TransportError>>>,
    paths: Mutex<Vec<String>>,
}

impl FakeRest {
    pub(crate) fn new(answers: Vec<Result<RestResponse, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            paths: Mutex::default(),
        })
    }

    pub(crate) fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

#[async_trait]
impl RestTransport for FakeRest {
    async fn get(&self, access_token: &str, path: &str) -> Result<RestResponse, TransportError> {
        assert_eq!(access_token, "token");
        self.paths.lock().unwrap().push(path.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(unanswered)
    }
}
