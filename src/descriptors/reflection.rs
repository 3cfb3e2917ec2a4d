//! Thin client over the gRPC server reflection v1alpha service. Hand-rolled
//! against `tonic::client::Grpc` + `tonic::codec::ProstCodec` rather than
//! codegen'd from a `.proto`, the same "no compile-time bindings" posture
//! the rest of the descriptor resolver takes.

use futures::StreamExt;
use prost::Message;
use prost_types::FileDescriptorProto;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::transport::Channel;
use tonic::Request;
use tonic_reflection::pb::server_reflection_request::MessageRequest;
use tonic_reflection::pb::server_reflection_response::MessageResponse;
use tonic_reflection::pb::{ServerReflectionRequest, ServerReflectionResponse};

use crate::error::{DescriptorError, TransportError};

const REFLECTION_PATH: &str = "/grpc.reflection.v1alpha.ServerReflection/ServerReflectionInfo";

pub struct ReflectionClient {
    grpc: Grpc<Channel>,
}

impl ReflectionClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            grpc: Grpc::new(channel),
        }
    }

    async fn call(&mut self, request: MessageRequest) -> Result<Vec<MessageResponse>, DescriptorError> {
        self.grpc
            .ready()
            .await
            .map_err(|e| DescriptorError::Transport(TransportError::Dial(e)))?;

        let req = ServerReflectionRequest {
            host: String::new(),
            message_request: Some(request),
        };
        let path = REFLECTION_PATH.parse().expect("static path is valid");
        let outbound = futures::stream::once(async move { req });
        let response = self
            .grpc
            .streaming(Request::new(outbound), path, ProstCodec::default())
            .await
            .map_err(DescriptorError::Reflection)?;

        let mut inbound = response.into_inner();
        let mut responses = Vec::new();
        while let Some(msg) = inbound.next().await {
            let msg: ServerReflectionResponse = msg.map_err(DescriptorError::Reflection)?;
            if let Some(resp) = msg.message_response {
                responses.push(resp);
            }
        }
        Ok(responses)
    }

    /// Lists every service the server exposes, as fully-qualified names.
    pub async fn list_services(&mut self) -> Result<Vec<String>, DescriptorError> {
        let responses = self.call(MessageRequest::ListServices(String::new())).await?;
        let mut names = Vec::new();
        for resp in responses {
            match resp {
                MessageResponse::ListServicesResponse(list) => {
                    names.extend(list.service.into_iter().map(|s| s.name));
                }
                MessageResponse::ErrorResponse(e) => {
                    return Err(DescriptorError::Malformed(format!(
                        "reflection list_services error {}: {}",
                        e.error_code, e.error_message
                    )))
                }
                _ => {}
            }
        }
        Ok(names)
    }

    /// Fetches the `FileDescriptorProto` declaring `symbol` (a fully
    /// qualified service or message name).
    pub async fn file_containing_symbol(
        &mut self,
        symbol: &str,
    ) -> Result<Vec<FileDescriptorProto>, DescriptorError> {
        let responses = self
            .call(MessageRequest::FileContainingSymbol(symbol.to_string()))
            .await?;
        self.decode_file_responses(responses, symbol)
    }

    /// Fetches a `FileDescriptorProto` by its proto filename, used to walk
    /// `dependency` edges the initial symbol lookup doesn't include.
    pub async fn file_by_filename(
        &mut self,
        filename: &str,
    ) -> Result<Vec<FileDescriptorProto>, DescriptorError> {
        let responses = self
            .call(MessageRequest::FileByFilename(filename.to_string()))
            .await?;
        self.decode_file_responses(responses, filename)
    }

    fn decode_file_responses(
        &self,
        responses: Vec<MessageResponse>,
        context: &str,
    ) -> Result<Vec<FileDescriptorProto>, DescriptorError> {
        let mut files = Vec::new();
        for resp in responses {
            match resp {
                MessageResponse::FileDescriptorResponse(fdr) => {
                    for raw in fdr.file_descriptor_proto {
                        let file = FileDescriptorProto::decode(raw.as_slice()).map_err(|source| {
                            DescriptorError::Decode {
                                type_url: context.to_string(),
                                source,
                            }
                        })?;
                        files.push(file);
                    }
                }
                MessageResponse::ErrorResponse(e) => {
                    return Err(DescriptorError::Malformed(format!(
                        "reflection error looking up `{context}`: {} {}",
                        e.error_code, e.error_message
                    )))
                }
                _ => {}
            }
        }
        Ok(files)
    }
}
