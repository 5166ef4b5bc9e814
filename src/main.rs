//! minicc CLI
//!
//! 入力ファイルごとにプリプロセス・字句解析・パースを行い、宣言木を出力する

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::Parser as ClapParser;
use log::debug;
use minicc::{CompileOptions, OutputType, Pipeline, PipelineError, SexpPrinter};

/// コマンドライン引数
#[derive(ClapParser)]
#[command(name = "minicc")]
#[command(version, about = "Front end for a small C-like language")]
struct Cli {
    /// 入力ファイル
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// インクルードパス (-I)
    #[arg(short = 'I', long = "include")]
    include: Vec<PathBuf>,

    /// マクロ定義 (-D NAME[=VALUE])
    #[arg(short = 'D', long = "define")]
    define: Vec<String>,

    /// 木の JSON を書き出すディレクトリ（省略時は標準出力）
    #[arg(short = 'o', long = "out")]
    out: Option<PathBuf>,

    /// 出力の種類
    #[arg(short = 't', long = "type", value_enum, default_value = "executable")]
    output_type: OutputType,

    /// リンクするライブラリ
    #[arg(short = 'l', long = "link")]
    link: Vec<String>,

    /// プリプロセッサ出力のみ (cc -E 相当)
    #[arg(short = 'E')]
    preprocess_only: bool,

    /// トークン列を出力
    #[arg(long = "tokens")]
    tokens: bool,

    /// 木を S-expression ではなく JSON で出力
    #[arg(long = "json")]
    json: bool,

    /// デバッグログを出力
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// 全入力を処理し、すべて成功したかを返す
fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let options = CompileOptions {
        out_dir: cli.out.clone(),
        output_type: cli.output_type,
        link: cli.link.clone(),
    };
    debug!("output type {:?}, link {:?}", options.output_type, options.link);

    let mut builder = Pipeline::builder().with_options(options);
    for dir in &cli.include {
        builder = builder.with_include(dir);
    }
    for (name, value) in parse_defines(&cli.define) {
        builder = builder.with_define(name, value);
    }
    let mut pipeline = builder.build();

    if let Some(dir) = &cli.out {
        fs::create_dir_all(dir)?;
    }

    let mut all_ok = true;
    for input in &cli.inputs {
        // 失敗しても残りのファイルは処理する
        if !process_file(&mut pipeline, input, &cli)? {
            all_ok = false;
        }
    }
    Ok(all_ok)
}

/// 1 ファイルを処理（I/O 以外のエラーは表示して false を返す）
fn process_file(pipeline: &mut Pipeline, input: &Path, cli: &Cli) -> Result<bool, Box<dyn std::error::Error>> {
    if cli.preprocess_only {
        return match pipeline.preprocess(input) {
            Ok(source) => {
                io::stdout().lock().write_all(source.text().as_bytes())?;
                Ok(true)
            }
            Err(e) => {
                eprintln!("{}", pipeline.format_error(&e));
                Ok(false)
            }
        };
    }

    let result = match pipeline.run_file(input) {
        Ok(result) => result,
        Err(PipelineError::Lex(errs)) => {
            eprintln!("{}:", input.display());
            eprintln!("{}", errs);
            return Ok(false);
        }
        Err(e) => {
            eprintln!("{}", pipeline.format_error(&e));
            return Ok(false);
        }
    };

    if cli.tokens {
        for token in &result.tokens {
            println!("{}", token);
        }
    }

    for diag in &result.outcome.diagnostics {
        match result.origin(diag.pos()) {
            Some(origin) => eprintln!("{} (in {})", diag, origin),
            None => eprintln!("{}", diag),
        }
    }

    // パースに失敗しても途中までの木は出力する
    if let Some(dir) = &cli.out {
        let path = result.write_tree_json(dir, input)?;
        println!("{}", path.display());
    } else if cli.json {
        println!("{}", result.outcome.tree.to_json()?);
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        let mut printer = SexpPrinter::new(&mut handle);
        printer.print_tree(&result.outcome.tree)?;
        handle.flush()?;
    }

    Ok(result.outcome.success())
}

/// -D 引数を (名前, 値) に分解
fn parse_defines(defines: &[String]) -> Vec<(String, Option<String>)> {
    defines
        .iter()
        .map(|s| {
            if let Some(pos) = s.find('=') {
                let (name, value) = s.split_at(pos);
                (name.to_string(), Some(value[1..].to_string()))
            } else {
                (s.clone(), None)
            }
        })
        .collect()
}
