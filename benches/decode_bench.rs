//! Request building and stream decoding benchmarks

use aicompare::models::{ContentPart, NormalizedRequest, ProviderConfig, ProviderType, StreamEvent};
use aicompare::providers::anthropic::{build_messages_body, AnthropicFrameParser};
use aicompare::providers::decode::{FrameParser, LineDecoder};
use aicompare::providers::gemini::{build_generate_body, GeminiFrameParser};
use aicompare::providers::openai_compat::{build_chat_body, OpenAIFrameParser};
use aicompare::Brand;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Build an OpenAI-style SSE body with `count` delta frames
fn openai_sse(count: usize) -> String {
    let mut body = String::new();
    for i in 0..count {
        body.push_str(&format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"token {} 风水\"}}}}]}}\n\n",
            i
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn anthropic_sse(count: usize) -> String {
    let mut body = String::from(
        "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":10}}}\n\n",
    );
    for i in 0..count {
        body.push_str(&format!(
            "event: content_block_delta\ndata: {{\"type\":\"content_block_delta\",\"delta\":{{\"type\":\"text_delta\",\"text\":\"token {}\"}}}}\n\n",
            i
        ));
    }
    body.push_str("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n");
    body
}

fn gemini_sse(count: usize) -> String {
    let mut body = String::new();
    for i in 0..count {
        body.push_str(&format!(
            "data: {{\"candidates\":[{{\"content\":{{\"parts\":[{{\"text\":\"token {}\"}}]}}}}]}}\r\n\r\n",
            i
        ));
    }
    body
}

/// Feed `body` through a decoder in fixed-size chunks and count events
fn decode_all<P: FrameParser>(body: &[u8], chunk_size: usize, mut parser: P) -> usize {
    let mut decoder = LineDecoder::new();
    let mut events = 0;
    for chunk in body.chunks(chunk_size) {
        for line in decoder.push(chunk) {
            events += parser.parse_line(&line).map(|e| e.len()).unwrap_or(0);
        }
    }
    events
}

fn vision_request() -> NormalizedRequest {
    NormalizedRequest::new("请分析这张图片")
        .with_system(Some("你是室内空间视觉理解与方位提取专家".to_string()))
        .with_content_parts(vec![
            ContentPart::image(format!("data:image/png;base64,{}", "A".repeat(64 * 1024))),
            ContentPart::text("请分析这张图片"),
        ])
}

fn bench_request_building(c: &mut Criterion) {
    let request = vision_request();
    let openai = ProviderConfig::new("doubao", ProviderType::OpenAICompat);
    let anthropic = ProviderConfig::new("claude", ProviderType::Anthropic);
    let gemini = ProviderConfig::new("gemini", ProviderType::Gemini);

    let mut group = c.benchmark_group("request_building");
    group.bench_function("openai_chat_body", |b| {
        b.iter(|| build_chat_body(black_box(&openai), black_box(&request), Brand::Doubao, false))
    });
    group.bench_function("anthropic_messages_body", |b| {
        b.iter(|| build_messages_body(black_box(&anthropic), black_box(&request), false))
    });
    group.bench_function("gemini_generate_body", |b| {
        b.iter(|| build_generate_body(black_box(&gemini), black_box(&request)))
    });
    group.finish();
}

fn bench_stream_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_decoding");

    for count in [10, 100, 1000].iter() {
        let openai = openai_sse(*count);
        let anthropic = anthropic_sse(*count);
        let gemini = gemini_sse(*count);

        group.bench_with_input(BenchmarkId::new("openai", count), count, |b, _| {
            b.iter(|| decode_all(black_box(openai.as_bytes()), 256, OpenAIFrameParser))
        });
        group.bench_with_input(BenchmarkId::new("anthropic", count), count, |b, _| {
            b.iter(|| decode_all(black_box(anthropic.as_bytes()), 256, AnthropicFrameParser::default()))
        });
        group.bench_with_input(BenchmarkId::new("gemini", count), count, |b, _| {
            b.iter(|| decode_all(black_box(gemini.as_bytes()), 256, GeminiFrameParser))
        });
    }
    group.finish();
}

fn bench_chunk_sizes(c: &mut Criterion) {
    let body = openai_sse(500);
    let mut group = c.benchmark_group("chunk_sizes");

    for size in [16, 256, 4096].iter() {
        group.bench_with_input(BenchmarkId::new("openai", size), size, |b, size| {
            b.iter(|| decode_all(black_box(body.as_bytes()), *size, OpenAIFrameParser))
        });
    }
    group.finish();
}

fn bench_ndjson_serialization(c: &mut Criterion) {
    let event = StreamEvent::Delta {
        id: "doubao".to_string(),
        delta: "东南角适合摆放绿植".to_string(),
    };
    c.bench_function("stream_event_to_ndjson", |b| {
        b.iter(|| black_box(&event).to_ndjson())
    });
}

criterion_group!(
    benches,
    bench_request_building,
    bench_stream_decoding,
    bench_chunk_sizes,
    bench_ndjson_serialization
);
criterion_main!(benches);
