//! CLI 모듈
//!
//! docrag CLI 명령어 정의 및 구현
//! - diagnose: 프로바이더 설정 점검 및 연결 테스트
//! - chat: 활성 프로바이더로 단일 대화
//! - search: 문서 파일로 하이브리드 검색기를 만들어 검색

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{ProviderConfig, Settings};
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::llm::{ChatCapable, ChatMessage, ChatParams, LlmFactory};
use crate::retriever::{Document, RetrieverBuilder, SearchMethod};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "docrag")]
#[command(version, about = "멀티 프로바이더 LLM + 하이브리드 검색 도구", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 프로바이더 설정 점검 및 연결 테스트
    Diagnose,

    /// 활성 프로바이더에 메시지 전송
    Chat {
        /// 보낼 메시지
        message: String,

        /// 시스템 프롬프트
        #[arg(short, long)]
        system: Option<String>,

        /// 모델 ID (watsonx 전용)
        #[arg(short, long)]
        model: Option<String>,

        /// 샘플링 온도
        #[arg(short, long)]
        temperature: Option<f64>,

        /// 최대 생성 토큰 수
        #[arg(long)]
        max_tokens: Option<u32>,
    },

    /// 문서에서 하이브리드 검색
    Search {
        /// 검색 쿼리
        query: String,

        /// 문서 경로 (JSONL 파일 또는 .txt/.md 폴더)
        #[arg(short, long)]
        docs: PathBuf,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli, settings: Settings) -> Result<()> {
    match cli.command {
        Commands::Diagnose => cmd_diagnose(&settings).await,
        Commands::Chat {
            message,
            system,
            model,
            temperature,
            max_tokens,
        } => cmd_chat(&settings, &message, system, model, temperature, max_tokens).await,
        Commands::Search { query, docs } => cmd_search(&settings, &query, &docs).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// diagnose 명령어 - 단계별로 점검하고 실패해도 계속 진행
async fn cmd_diagnose(settings: &Settings) -> Result<()> {
    println!("docrag v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("[*] 프로바이더: {}", settings.llm_provider);

    let config = match settings.provider_config() {
        Ok(config) => config,
        Err(e) => {
            println!("[!] 프로바이더 설정 오류: {}", e);
            return Ok(());
        }
    };

    let api_key = match &config {
        ProviderConfig::Watsonx(cfg) => &cfg.api_key,
        ProviderConfig::DeepSeek(cfg)
        | ProviderConfig::OpenAi(cfg)
        | ProviderConfig::Ollama(cfg) => &cfg.api_key,
    };
    if api_key.is_empty() {
        println!("[!] API 키: 미설정");
    } else {
        println!("[OK] API 키: {}", mask_key(api_key));
    }

    // 1. 채팅 클라이언트
    match LlmFactory::get_llm(settings, None, ChatParams::new()) {
        Ok(llm) => {
            println!("[OK] LLM 생성됨 (모델: {})", llm.model());

            println!("[*] 테스트 메시지 전송 중...");
            match llm.chat(&[ChatMessage::user("Hello")], &ChatParams::new()).await {
                Ok(response) => println!(
                    "[OK] 응답: {}",
                    truncate_text(response.content().unwrap_or_default(), 100)
                ),
                Err(e) => println!("[!] 채팅 실패: {}", e),
            }
        }
        Err(e) => println!("[!] LLM 생성 실패: {}", e),
    }

    // 2. 임베딩
    match create_embedder(settings) {
        Ok(embedder) => {
            println!("[OK] 임베딩 생성됨 (모델: {})", embedder.name());
            match embedder.embed("Hello").await {
                Ok(vector) => println!("[OK] 임베딩 차원: {}", vector.len()),
                Err(e) => println!("[!] 임베딩 실패: {}", e),
            }
        }
        Err(e) => println!("[!] 임베딩 초기화 실패: {}", e),
    }

    Ok(())
}

/// chat 명령어
async fn cmd_chat(
    settings: &Settings,
    message: &str,
    system: Option<String>,
    model: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
) -> Result<()> {
    let llm = LlmFactory::get_llm(settings, model.as_deref(), ChatParams::new())
        .context("LLM 생성 실패")?;

    let mut messages = Vec::new();
    if let Some(system) = system {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(message));

    let params = ChatParams {
        temperature,
        max_tokens,
        ..ChatParams::new()
    };

    let response = llm
        .chat(&messages, &params)
        .await
        .with_context(|| format!("{} 호출 실패", llm.provider()))?;

    println!("{}", response.content().unwrap_or_default());
    Ok(())
}

/// search 명령어
async fn cmd_search(settings: &Settings, query: &str, docs_path: &Path) -> Result<()> {
    let docs = load_documents(docs_path)?;
    if docs.is_empty() {
        bail!("문서를 찾을 수 없습니다: {}", docs_path.display());
    }

    println!("[*] 문서 {} 건 인덱싱 중...", docs.len());
    let builder = RetrieverBuilder::new(settings).context("검색기 빌더 생성 실패")?;
    let retriever = builder
        .build_hybrid_retriever(&docs)
        .await
        .context("하이브리드 검색기 생성 실패")?;

    println!("[*] 검색 중: \"{}\"", query);
    let results = retriever.search(query).await?;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        let method = match result.method {
            SearchMethod::Lexical => "BM25",
            SearchMethod::Vector => "Vector",
            SearchMethod::Hybrid => "Hybrid",
        };
        println!("{}. [{}] score: {:.4}", i + 1, method, result.score);
        if let Some(source) = result.document.metadata.get("source").and_then(|v| v.as_str()) {
            println!("   출처: {}", source);
        }
        println!("   내용: {}", truncate_text(&result.document.page_content, 200));
        println!();
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 문서 로드
///
/// - 파일: JSON Lines (`{"page_content": ..., "metadata": {...}}` 한 줄에 하나)
/// - 폴더: `.txt`/`.md` 파일 하나가 문서 하나 (이름순, 재귀 없음)
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    if path.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(path)
            .with_context(|| format!("폴더를 읽을 수 없습니다: {}", path.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && matches!(
                        p.extension().and_then(|e| e.to_str()),
                        Some("txt") | Some("md")
                    )
            })
            .collect();
        files.sort();

        let mut docs = Vec::with_capacity(files.len());
        for file in files {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("파일을 읽을 수 없습니다: {}", file.display()))?;
            docs.push(Document::new(content).with_metadata("source", file.display().to_string()));
        }
        return Ok(docs);
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("파일을 읽을 수 없습니다: {}", path.display()))?;

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<Document>(line)
                .with_context(|| format!("{}:{} JSON 파싱 실패", path.display(), i + 1))
        })
        .collect()
}

/// API 키 앞 5자만 표시
fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(5).collect();
    format!("{}...", prefix)
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
