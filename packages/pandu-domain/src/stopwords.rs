pub(crate) const ENGLISH: &[&str] = &[
	"a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "do", "for", "from", "has",
	"have", "how", "in", "is", "it", "of", "on", "or", "that", "the", "this", "to", "was", "what",
	"when", "where", "which", "who", "will", "with",
];

pub(crate) const INDONESIAN: &[&str] = &[
	"ada", "adalah", "akan", "antara", "apa", "atau", "bagaimana", "bagi", "bahwa", "cara",
	"dalam", "dan", "dari", "dengan", "di", "dia", "harus", "ini", "itu", "jika", "juga", "kami",
	"kapan", "ke", "kepada", "mana", "mereka", "oleh", "pada", "para", "saya", "sebagai", "sudah",
	"tentang", "tidak", "untuk", "yang",
];
