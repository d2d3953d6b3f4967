use bytes::Bytes;
use http::{Method, Request, StatusCode};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    FileDescriptorSet, MessageOptions, MethodDescriptorProto, ServiceDescriptorProto,
};
use std::sync::Arc;
use transcode_core::prost_reflect::{self, DescriptorPool, DynamicMessage};
use transcode_core::reflect::{ReflectError, schema_from_pool};
use transcode_core::schema::FieldKind;
use transcode_core::{CodecOptions, HandlerRegistry, HttpRule, JsonCodec, MessageValue, Transcoder, Value};

fn field(name: &str, number: i32, kind: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        r#type: Some(kind as i32),
        label: Some(Label::Optional as i32),
        ..Default::default()
    }
}

fn typed(name: &str, number: i32, kind: Type, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..field(name, number, kind)
    }
}

fn repeated(field: FieldDescriptorProto) -> FieldDescriptorProto {
    FieldDescriptorProto {
        label: Some(Label::Repeated as i32),
        ..field
    }
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

fn method(name: &str, input: &str, output: &str, streaming: bool) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_string()),
        input_type: Some(input.to_string()),
        output_type: Some(output.to_string()),
        server_streaming: Some(streaming),
        ..Default::default()
    }
}

fn pool() -> DescriptorPool {
    let any = FileDescriptorProto {
        name: Some("google/protobuf/any.proto".to_string()),
        package: Some("google.protobuf".to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![message(
            "Any",
            vec![field("type_url", 1, Type::String), field("value", 2, Type::Bytes)],
        )],
        ..Default::default()
    };

    let labels_entry = DescriptorProto {
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..message(
            "LabelsEntry",
            vec![field("key", 1, Type::String), field("value", 2, Type::String)],
        )
    };

    let shelf = DescriptorProto {
        nested_type: vec![labels_entry],
        ..message(
            "Shelf",
            vec![
                field("id", 1, Type::Int64),
                field("shelf_theme", 2, Type::String),
                typed("genre", 3, Type::Enum, ".library.Genre"),
                repeated(field("tags", 4, Type::String)),
                typed("extra", 5, Type::Message, ".google.protobuf.Any"),
                repeated(typed("labels", 6, Type::Message, ".library.Shelf.LabelsEntry")),
                field("count", 7, Type::Sint32),
            ],
        )
    };

    let library = FileDescriptorProto {
        name: Some("library.proto".to_string()),
        package: Some("library".to_string()),
        syntax: Some("proto3".to_string()),
        dependency: vec!["google/protobuf/any.proto".to_string()],
        enum_type: vec![EnumDescriptorProto {
            name: Some("Genre".to_string()),
            value: vec![
                EnumValueDescriptorProto {
                    name: Some("GENRE_UNSPECIFIED".to_string()),
                    number: Some(0),
                    ..Default::default()
                },
                EnumValueDescriptorProto {
                    name: Some("POETRY".to_string()),
                    number: Some(1),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }],
        message_type: vec![shelf, message("GetShelfRequest", vec![field("shelf", 1, Type::Int64)])],
        service: vec![
            ServiceDescriptorProto {
                name: Some("Library".to_string()),
                method: vec![
                    method("GetShelf", ".library.GetShelfRequest", ".library.Shelf", false),
                    method("WatchShelf", ".library.GetShelfRequest", ".library.Shelf", true),
                ],
                ..Default::default()
            },
            ServiceDescriptorProto {
                name: Some("Admin".to_string()),
                method: vec![method("Purge", ".library.GetShelfRequest", ".library.Shelf", false)],
                ..Default::default()
            },
        ],
        ..Default::default()
    };

    DescriptorPool::from_file_descriptor_set(FileDescriptorSet {
        file: vec![any, library],
    })
    .unwrap()
}

fn get_shelf_rule() -> HttpRule {
    HttpRule {
        selector: "library.Library.GetShelf".to_string(),
        get: Some("/v1/shelves/{shelf}".to_string()),
        additional_bindings: vec![HttpRule {
            post: Some("/v1/shelves/{shelf}:get".to_string()),
            body: Some("*".to_string()),
            ..Default::default()
        }],
        ..Default::default()
    }
}

#[test]
fn test_messages_and_enums_are_converted() {
    let schema = schema_from_pool(&pool(), &[], &[]).unwrap();

    let shelf = schema.message("library.Shelf").unwrap();
    let kinds = shelf
        .fields()
        .iter()
        .map(|f| (f.name(), f.kind().clone(), f.is_repeated()))
        .collect::<Vec<_>>();

    assert_eq!(
        kinds,
        [
            ("id", FieldKind::Int64, false),
            ("shelf_theme", FieldKind::String, false),
            ("genre", FieldKind::Enum("library.Genre".to_string()), false),
            ("tags", FieldKind::String, true),
            ("extra", FieldKind::Any, false),
            ("count", FieldKind::Int32, false),
        ]
    );
    assert_eq!(shelf.field_by_name("shelf_theme").unwrap().1.json_name(), "shelfTheme");

    let genre = schema.enum_type("library.Genre").unwrap();
    assert_eq!(genre.number_of("POETRY"), Some(1));

    // Map entries are not exposed as messages
    assert!(schema.message("library.Shelf.LabelsEntry").is_none());
}

#[test]
fn test_proto3_enums_accept_undeclared_numbers() {
    let pool = pool();
    let schema = schema_from_pool(&pool, &[], &[]).unwrap();
    let shelf = schema.message("library.Shelf").unwrap();
    assert!(shelf.field_by_name("genre").unwrap().1.allows_unknown_enum());

    // A newer upstream may send numbers this descriptor set does not declare
    let mut upstream = DynamicMessage::new(pool.get_message_by_name("library.Shelf").unwrap());
    upstream.set_field_by_name("genre", prost_reflect::Value::EnumNumber(7));
    let json = serde_json::to_value(&upstream).unwrap();
    assert_eq!(json, serde_json::json!({ "genre": 7 }));

    let codec = JsonCodec::new(&schema, CodecOptions::default());
    let message = codec.decode_message(shelf, &json).unwrap();
    assert_eq!(message.get("genre"), Some(&Value::Enum(7)));
    assert_eq!(codec.encode_message(&message), json);
}

#[test]
fn test_streaming_methods_are_skipped() {
    let schema = schema_from_pool(&pool(), &[], &[]).unwrap();

    let library = schema.service("library.Library").unwrap();
    let names = library.methods().iter().map(|m| m.name()).collect::<Vec<_>>();
    assert_eq!(names, ["GetShelf"]);
}

#[test]
fn test_rules_become_bindings() {
    let schema = schema_from_pool(&pool(), &[], &[get_shelf_rule()]).unwrap();

    let method = schema.method("library.Library.GetShelf").unwrap();
    let bindings = method.bindings().iter().map(|b| b.to_string()).collect::<Vec<_>>();
    assert_eq!(bindings, ["GET /v1/shelves/{shelf}", "POST /v1/shelves/{shelf}:get"]);

    assert!(schema.method("library.Admin.Purge").unwrap().bindings().is_empty());
}

#[test]
fn test_service_allow_list() {
    let services = ["library.Library".to_string()];
    let schema = schema_from_pool(&pool(), &services, &[]).unwrap();
    assert!(schema.service("library.Library").is_some());
    assert!(schema.service("library.Admin").is_none());

    let err = schema_from_pool(&pool(), &["library.Missing".to_string()], &[]).unwrap_err();
    assert!(matches!(err, ReflectError::ServiceNotFound(name) if name == "library.Missing"));
}

#[test]
fn test_invalid_rules_are_rejected() {
    let unknown = HttpRule {
        selector: "library.Library.Nope".to_string(),
        get: Some("/v1/nope".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        schema_from_pool(&pool(), &[], &[unknown]),
        Err(ReflectError::UnknownSelector(_))
    ));

    let streaming = HttpRule {
        selector: "library.Library.WatchShelf".to_string(),
        get: Some("/v1/watch".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        schema_from_pool(&pool(), &[], &[streaming]),
        Err(ReflectError::UnknownSelector(_))
    ));

    let malformed = HttpRule {
        selector: "library.Library.GetShelf".to_string(),
        get: Some("/v1/{shelf=**}/x".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        schema_from_pool(&pool(), &[], &[malformed]),
        Err(ReflectError::InvalidRule { .. })
    ));
}

#[tokio::test]
async fn test_reflected_schema_serves_requests() {
    let schema = Arc::new(schema_from_pool(&pool(), &[], &[get_shelf_rule()]).unwrap());

    let output = schema.message("library.Shelf").unwrap().clone();
    let handlers = HandlerRegistry::new().register("library.Library.GetShelf", move |request: MessageValue| {
        let id = request.get("shelf").cloned().unwrap_or(Value::Int64(0));
        let response = MessageValue::new(output.clone())
            .with("id", id)
            .and_then(|shelf| shelf.with("shelf_theme", "Poetry"))
            .map_err(|e| transcode_core::Status::internal(e.to_string()));
        async move { response }
    });
    let transcoder = Transcoder::new(schema, handlers).unwrap();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/v1/shelves/12")
        .body(Bytes::new())
        .unwrap();
    let response = transcoder.handle(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_ref(), br#"{"id":"12","shelfTheme":"Poetry"}"#);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/shelves/12:get")
        .body(Bytes::from_static(b"{}"))
        .unwrap();
    assert_eq!(transcoder.handle(request).await.status(), StatusCode::OK);
}
