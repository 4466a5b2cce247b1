//! CLI 모듈
//!
//! ria-assist CLI 명령어 정의 및 구현

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::RiaConfig;
use crate::knowledge::SourceKind;
use crate::pipeline::Pipeline;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "ria-assist")]
#[command(version, about = "규제 준수 근거 검색 어시스턴트", long_about = None)]
pub struct Cli {
    /// 데이터 디렉토리 (기본: RIA_DATA_DIR 또는 ~/.local/share/.ria-assist)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// raw/ 폴더와 web_urls.txt 전체 재인덱싱
    Ingest,

    /// 근거 기반 구조화 답변 (JSON 출력)
    Ask {
        /// 질문
        question: String,

        /// 검색 구절 수
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// 관련 조항 원문 목록 (생성 호출 없음)
    Exact {
        question: String,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// 짧은 판정 (생성 호출 없음)
    Concise {
        question: String,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// 하이브리드 검색 결과 보기
    Search {
        query: String,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// 문서 버전 이력 (문서 ID 생략 시 전체 문서 목록)
    History { doc_id: Option<String> },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = RiaConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let default_k = config.top_k;
    let k = |top_k: Option<usize>| top_k.unwrap_or(default_k);

    match cli.command {
        Commands::Ingest => cmd_ingest(config).await,
        Commands::Ask { question, top_k } => cmd_ask(config, &question, k(top_k)).await,
        Commands::Exact { question, top_k } => {
            let pipeline = open(config)?;
            println!("{}", pipeline.answer_exact(&question, k(top_k))?);
            Ok(())
        }
        Commands::Concise { question, top_k } => {
            let pipeline = open(config)?;
            println!("{}", pipeline.answer_concise(&question, k(top_k))?);
            Ok(())
        }
        Commands::Search { query, top_k } => cmd_search(config, &query, k(top_k)),
        Commands::History { doc_id } => cmd_history(config, doc_id).await,
        Commands::Status => cmd_status(config).await,
    }
}

fn open(config: RiaConfig) -> Result<Pipeline> {
    let data_dir = config.data_dir.clone();
    Pipeline::open(config).with_context(|| format!("파이프라인 열기 실패: {}", data_dir.display()))
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 재인덱싱 명령어 (ingest)
async fn cmd_ingest(config: RiaConfig) -> Result<()> {
    let pipeline = open(config)?;

    let sources = pipeline.scan_sources().context("수집 대상 검색 실패")?;
    if sources.is_empty() {
        println!(
            "[!] 수집할 소스가 없습니다. {} 또는 {}를 확인하세요.",
            pipeline.config().raw_dir().display(),
            pipeline.config().url_list_path().display()
        );
        return Ok(());
    }

    let files = sources.iter().filter(|s| s.kind == SourceKind::File).count();
    println!(
        "[*] 수집 대상: {} 건 (파일 {}, URL {})",
        sources.len(),
        files,
        sources.len() - files
    );

    let report = pipeline
        .reindex_sources(&sources)
        .await
        .context("재인덱싱 실패")?;

    println!();
    println!(
        "[OK] 완료: 소스 {}, 건너뜀 {}, 새 버전 {}, 청크 {}",
        report.sources_seen, report.sources_skipped, report.new_versions, report.chunks_written
    );
    match report.generation {
        Some(generation) => println!("     인덱스 세대: {}", generation),
        None => println!("     인덱스 없음"),
    }

    Ok(())
}

/// 답변 명령어 (ask)
async fn cmd_ask(config: RiaConfig, question: &str, top_k: usize) -> Result<()> {
    if !config.generation.has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export OPENAI_API_KEY=your-api-key\n\n\
             생성 없이 조항만 보려면 `ria-assist exact`를 사용하세요."
        );
    }

    let pipeline = open(config)?;
    let answer = pipeline
        .answer(question, top_k)
        .await
        .context("답변 생성 실패")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&answer).context("답변 직렬화 실패")?
    );

    Ok(())
}

/// 검색 명령어 (search)
fn cmd_search(config: RiaConfig, query: &str, top_k: usize) -> Result<()> {
    let pipeline = open(config)?;

    println!("[*] 검색 중: \"{}\"", query);

    let results = pipeline.retrieve(query, top_k).context("검색 실패")?;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());

    for result in &results {
        let chunk = &result.chunk;
        println!(
            "{}. [BM25: {:.4}] [COS: {:.4}] {} p.{} #{}",
            result.rank + 1,
            result.lexical_score,
            result.dense_score,
            chunk.source,
            chunk.page,
            chunk.chunk_id
        );
        if let Some(ref clause) = chunk.clause {
            println!("   조항: {}", clause);
        }
        println!("   버전: {}", truncate_text(&chunk.version_hash, 12));
        println!("   내용: {}", truncate_text(&chunk.text, 200));
        println!();
    }

    Ok(())
}

/// 이력 명령어 (history)
async fn cmd_history(config: RiaConfig, doc_id: Option<String>) -> Result<()> {
    let pipeline = open(config)?;

    let Some(doc_id) = doc_id else {
        let docs = pipeline.documents().await;
        if docs.is_empty() {
            println!("[!] 등록된 문서가 없습니다.");
            return Ok(());
        }

        println!("[OK] 등록된 문서 ({} 건):\n", docs.len());
        for doc in docs {
            let versions = pipeline.history(&doc.doc_id).await.len();
            println!("  [{}] {}", doc.source_kind.as_str(), truncate_text(&doc.doc_id, 60));
            println!(
                "        최신 {} | {} | 버전 {} 개",
                truncate_text(&doc.version_hash, 12),
                doc.created_at.format("%Y-%m-%d %H:%M"),
                versions
            );
        }
        return Ok(());
    };

    let history = pipeline.history(&doc_id).await;
    if history.is_empty() {
        bail!("문서 '{}'의 이력을 찾을 수 없습니다", doc_id);
    }

    println!("[OK] {} 버전 이력 ({} 건):\n", doc_id, history.len());
    for (i, version) in history.iter().enumerate() {
        println!(
            "  {}. {} | {} | {}",
            i + 1,
            truncate_text(&version.version_hash, 12),
            version.created_at.format("%Y-%m-%d %H:%M:%S"),
            version.locator
        );
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: RiaConfig) -> Result<()> {
    println!("ria-assist v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());

    if config.generation.has_api_key() {
        println!("[OK] API 키: 설정됨 (모델: {})", config.generation.model);
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export OPENAI_API_KEY=your-key");
    }

    let index_bytes: u64 = std::fs::read_dir(config.index_dir())
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.metadata().ok())
                .map(|m| m.len())
                .sum()
        })
        .unwrap_or(0);

    match Pipeline::open(config) {
        Ok(pipeline) => {
            let status = pipeline.status().await;
            println!(
                "[OK] 문서: {} 건 (매니페스트 {} 행)",
                status.documents, status.manifest_records
            );
            println!(
                "[OK] 인덱스: {} 청크, {} 차원",
                status.indexed_chunks, status.dimension
            );
            match status.generation {
                Some(generation) => println!("     세대: {}", generation),
                None => println!("     세대: 없음 (ingest 필요)"),
            }
            println!("     디스크: {}", format_bytes(index_bytes));
        }
        Err(e) => {
            println!("[!] 파이프라인 열기 실패: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

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

/// 바이트 크기 포맷팅
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
