use std::hint::black_box;

use bencher::{TestCase, TestFile};
use bytes::Bytes;
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use micro_fcgi::MemoryConnection;
use micro_fcgi_request::Request;
use micro_fcgi_request::codec::{query_string_parse, url_decode};
use micro_fcgi_request::multipart::{extract_boundary, parse_multipart};

static MULTIPART_FIELDS: TestFile = TestFile::new(
    "fields.txt",
    "multipart/form-data; boundary=------------------------5f1c2a9d7e3b4c60",
    include_str!("../resources/multipart/fields.txt"),
);
static MULTIPART_UPLOAD: TestFile = TestFile::new(
    "upload.txt",
    "multipart/form-data; boundary=\"----micro-fcgi-bench-0a1b2c\"",
    include_str!("../resources/multipart/upload.txt"),
);
static URLENCODED_FORM: TestFile = TestFile::new(
    "urlencoded.txt",
    "application/x-www-form-urlencoded",
    include_str!("../resources/form/urlencoded.txt"),
);

fn multipart_cases() -> Vec<TestCase> {
    vec![TestCase::small("multipart_fields", MULTIPART_FIELDS), TestCase::large("multipart_upload", MULTIPART_UPLOAD)]
}

fn request_cases() -> Vec<TestCase> {
    vec![
        TestCase::small("urlencoded_form", URLENCODED_FORM),
        TestCase::small("multipart_fields", MULTIPART_FIELDS),
        TestCase::large("multipart_upload", MULTIPART_UPLOAD),
    ]
}

fn benchmark_multipart(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("multipart");

    for case in multipart_cases() {
        let body = case.file().wire_content();
        let boundary = extract_boundary(case.file().content_type()).expect("fixture content type should carry a boundary");

        group.throughput(Throughput::Bytes(body.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), &body, |b, body| {
            b.iter(|| black_box(parse_multipart(&boundary, body)));
        });
    }

    group.finish();
}

fn benchmark_request_parse(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("request_parse");

    for case in request_cases() {
        let body = Bytes::from(case.file().wire_content());
        let environment = [
            "REQUEST_METHOD=POST".to_owned(),
            "SCRIPT_NAME=/submit".to_owned(),
            "QUERY_STRING=page=1&sort=desc".to_owned(),
            "HTTP_COOKIE=session=abc123; theme=dark".to_owned(),
            format!("CONTENT_TYPE={}", case.file().content_type()),
            format!("CONTENT_LENGTH={}", body.len()),
        ];

        group.throughput(Throughput::Bytes(body.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), &body, |b, body| {
            b.iter_batched(
                || Request::from_connection(MemoryConnection::new(environment.clone(), body.clone()).0),
                |mut request| {
                    request.parse().expect("in-memory body should be readable");
                    black_box(request)
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn benchmark_form_codec(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("form_codec");
    let form = URLENCODED_FORM.content().trim_end();

    group.throughput(Throughput::Bytes(form.len() as u64));
    group.bench_function("query_string_parse", |b| b.iter(|| black_box(query_string_parse(black_box(form)))));
    group.bench_function("url_decode", |b| b.iter(|| black_box(url_decode(black_box(form)))));

    group.finish();
}

criterion_group!(parser, benchmark_multipart, benchmark_request_parse, benchmark_form_codec);
criterion_main!(parser);
