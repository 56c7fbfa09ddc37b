//! Forward Pass Demonstration
//!
//! Builds models of a few sizes, prints their parameter counts, and runs a
//! forward pass through a tiny one:
//! - per-layer hidden state statistics
//! - per-head attention weights of the first layer
//! - next-token logits for the last position
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --example forward_pass
//! ```

use gpt2_infer::{GPT2Model, ModelConfig, PositionalKind};

fn main() -> gpt2_infer::Result<()> {
    println!("\n{}", "=".repeat(70));
    println!("  GPT-2 Forward Pass Demonstration");
    println!("{}", "=".repeat(70));

    // ========== Model Configurations ==========
    println!("\n{}", "─".repeat(70));
    println!("1. Model Configurations");
    println!("{}", "─".repeat(70));

    let vocab_size = 512;
    let configs = [
        ("Tiny", ModelConfig::tiny(vocab_size)),
        ("Small", ModelConfig::small(vocab_size)),
        ("Medium", ModelConfig::medium(vocab_size)),
    ];
    for (name, config) in &configs {
        let model = GPT2Model::new(config)?;
        println!(
            "  {:<8} embd={:<4} heads={:<2} layers={:<2} ctx={:<4} params={}",
            name,
            config.embed_dim,
            config.num_heads,
            config.num_layers,
            config.max_seq_len,
            model.count_parameters()
        );
    }

    // ========== Forward Pass ==========
    println!("\n{}", "─".repeat(70));
    println!("2. Forward Pass");
    println!("{}", "─".repeat(70));

    let mut config = ModelConfig::new(10, 4, 4, 2, 1, 8).with_positional(PositionalKind::Sinusoidal);
    config.init_std = 0.5;
    let model = GPT2Model::new(&config)?;
    let tokens = [1, 2, 3];
    println!("  input tokens: {tokens:?}");

    let states = model.hidden_states(&tokens)?;
    for (i, state) in states.iter().enumerate() {
        let mean = state.data.iter().sum::<f32>() / state.data.len() as f32;
        let label = if i == 0 { "embeddings".to_string() } else { format!("layer {i}") };
        println!("  {label:<12} shape={:?} mean={mean:+.4}", state.shape);
    }

    // ========== Attention Weights ==========
    println!("\n{}", "─".repeat(70));
    println!("3. Attention Weights (layer 1)");
    println!("{}", "─".repeat(70));

    let layer = &model.layers()[0];
    let normed = layer.ln_1.forward(&states[0])?;
    for (h, probs) in layer.attn.attention_probs(&normed)?.iter().enumerate() {
        println!("  head {h}:");
        for row in probs.to_rows() {
            let cells: Vec<String> = row.iter().map(|p| format!("{p:.3}")).collect();
            println!("    [{}]", cells.join(" "));
        }
    }

    // ========== Logits ==========
    println!("\n{}", "─".repeat(70));
    println!("4. Next-Token Logits");
    println!("{}", "─".repeat(70));

    let logits = model.forward(&tokens)?;
    for (id, score) in logits.iter().enumerate() {
        println!("  token {id:>2}: {score:+.5}");
    }

    println!("\n{}", "=".repeat(70));
    Ok(())
}
