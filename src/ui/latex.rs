//! Inline `$...$` and display `$$...$$` math rewritten as Unicode text

use regex::{Captures, Regex};
use std::sync::OnceLock;

const SYMBOLS: &[(&str, &str)] = &[
    ("alpha", "α"),
    ("beta", "β"),
    ("gamma", "γ"),
    ("delta", "δ"),
    ("epsilon", "ε"),
    ("theta", "θ"),
    ("lambda", "λ"),
    ("mu", "μ"),
    ("pi", "π"),
    ("rho", "ρ"),
    ("sigma", "σ"),
    ("tau", "τ"),
    ("phi", "φ"),
    ("omega", "ω"),
    ("Gamma", "Γ"),
    ("Delta", "Δ"),
    ("Theta", "Θ"),
    ("Lambda", "Λ"),
    ("Pi", "Π"),
    ("Sigma", "Σ"),
    ("Phi", "Φ"),
    ("Omega", "Ω"),
    ("infty", "∞"),
    ("times", "×"),
    ("cdot", "·"),
    ("div", "÷"),
    ("pm", "±"),
    ("le", "≤"),
    ("leq", "≤"),
    ("ge", "≥"),
    ("geq", "≥"),
    ("neq", "≠"),
    ("ne", "≠"),
    ("approx", "≈"),
    ("equiv", "≡"),
    ("to", "→"),
    ("rightarrow", "→"),
    ("leftarrow", "←"),
    ("Rightarrow", "⇒"),
    ("Leftrightarrow", "⇔"),
    ("sum", "∑"),
    ("prod", "∏"),
    ("int", "∫"),
    ("partial", "∂"),
    ("nabla", "∇"),
    ("in", "∈"),
    ("notin", "∉"),
    ("subset", "⊂"),
    ("cup", "∪"),
    ("cap", "∩"),
    ("forall", "∀"),
    ("exists", "∃"),
    ("ldots", "…"),
    ("cdots", "⋯"),
    ("degree", "°"),
];

struct Patterns {
    display: Regex,
    inline: Regex,
    text_cmd: Regex,
    script: Regex,
    frac: Regex,
    sqrt: Regex,
    spacing: Regex,
    command: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |pattern: &str| Regex::new(pattern).expect("valid LaTeX regex");
        Patterns {
            display: re(r"(?s)\$\$(.+?)\$\$"),
            inline: re(r"\$(.+?)\$"),
            text_cmd: re(r"\\(?:text|mathrm|mathbf|mathit|operatorname)\{([^{}]*)\}"),
            script: re(r"([\^_])\{([^{}]*)\}"),
            frac: re(r"\\frac\{([^{}]*)\}\{([^{}]*)\}"),
            sqrt: re(r"\\sqrt\{([^{}]*)\}"),
            spacing: re(r"\\[,;:! ]"),
            command: re(r"\\([A-Za-z]+)"),
        }
    })
}

/// Convert a LaTeX expression to plain text
pub fn latex_to_text(expr: &str) -> String {
    let p = patterns();
    let text = p.text_cmd.replace_all(expr, "$1");
    let text = p.script.replace_all(&text, "$1$2");
    let text = p.frac.replace_all(&text, "$1/$2");
    let text = p.sqrt.replace_all(&text, "√($1)");
    let text = p.spacing.replace_all(&text, " ");
    let text = p.command.replace_all(&text, |caps: &Captures| {
        let name = &caps[1];
        SYMBOLS
            .iter()
            .find(|(cmd, _)| *cmd == name)
            .map(|(_, symbol)| symbol.to_string())
            .unwrap_or_else(|| name.to_string())
    });
    text.replace(['{', '}'], "").trim().to_string()
}

/// Replace math spans in `text`, display math first
pub fn render_latex(text: &str) -> String {
    let p = patterns();
    let text = p
        .display
        .replace_all(text, |caps: &Captures| latex_to_text(&caps[1]));
    p.inline
        .replace_all(&text, |caps: &Captures| latex_to_text(&caps[1]))
        .into_owned()
}
