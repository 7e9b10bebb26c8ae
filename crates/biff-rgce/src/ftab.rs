//! Built-in function table (`iftab` -> name) and fixed argument counts.
//!
//! `PtgFunc` only stores the `iftab`; its argument count is implied by the function. `PtgFuncVar`
//! carries an explicit count, so only the name is needed there.

/// `iftab` used by user-defined, add-in, and future functions. The function name is the first
/// argument on the stack (usually a `PtgNameX`).
pub const FTAB_USER_DEFINED: u16 = 255;

/// BIFF8 function names indexed by `iftab`. Empty strings are reserved ids.
const FTAB: [&str; 380] = [
    /*   0 */ "COUNT", "IF", "ISNA", "ISERROR", "SUM", "AVERAGE",
    /*   6 */ "MIN", "MAX", "ROW", "COLUMN", "NA", "NPV",
    /*  12 */ "STDEV", "DOLLAR", "FIXED", "SIN", "COS", "TAN",
    /*  18 */ "ATAN", "PI", "SQRT", "EXP", "LN", "LOG10",
    /*  24 */ "ABS", "INT", "SIGN", "ROUND", "LOOKUP", "INDEX",
    /*  30 */ "REPT", "MID", "LEN", "VALUE", "TRUE", "FALSE",
    /*  36 */ "AND", "OR", "NOT", "MOD", "DCOUNT", "DSUM",
    /*  42 */ "DAVERAGE", "DMIN", "DMAX", "DSTDEV", "VAR", "DVAR",
    /*  48 */ "TEXT", "LINEST", "TREND", "LOGEST", "GROWTH", "GOTO",
    /*  54 */ "HALT", "RETURN", "PV", "FV", "NPER", "PMT",
    /*  60 */ "RATE", "MIRR", "IRR", "RAND", "MATCH", "DATE",
    /*  66 */ "TIME", "DAY", "MONTH", "YEAR", "WEEKDAY", "HOUR",
    /*  72 */ "MINUTE", "SECOND", "NOW", "AREAS", "ROWS", "COLUMNS",
    /*  78 */ "OFFSET", "ABSREF", "RELREF", "ARGUMENT", "SEARCH", "TRANSPOSE",
    /*  84 */ "ERROR", "STEP", "TYPE", "ECHO", "SET.NAME", "CALLER",
    /*  90 */ "DEREF", "WINDOWS", "SERIES", "DOCUMENTS", "ACTIVE.CELL", "SELECTION",
    /*  96 */ "RESULT", "ATAN2", "ASIN", "ACOS", "CHOOSE", "HLOOKUP",
    /* 102 */ "VLOOKUP", "LINKS", "INPUT", "ISREF", "GET.FORMULA", "GET.NAME",
    /* 108 */ "SET.VALUE", "LOG", "EXEC", "CHAR", "LOWER", "UPPER",
    /* 114 */ "PROPER", "LEFT", "RIGHT", "EXACT", "TRIM", "REPLACE",
    /* 120 */ "SUBSTITUTE", "CODE", "NAMES", "DIRECTORY", "FIND", "CELL",
    /* 126 */ "ISERR", "ISTEXT", "ISNUMBER", "ISBLANK", "T", "N",
    /* 132 */ "FOPEN", "FCLOSE", "FSIZE", "FREADLN", "FREAD", "FWRITELN",
    /* 138 */ "FWRITE", "FPOS", "DATEVALUE", "TIMEVALUE", "SLN", "SYD",
    /* 144 */ "DDB", "GET.DEF", "REFTEXT", "TEXTREF", "INDIRECT", "REGISTER",
    /* 150 */ "CALL", "ADD.BAR", "ADD.MENU", "ADD.COMMAND", "ENABLE.COMMAND", "CHECK.COMMAND",
    /* 156 */ "RENAME.COMMAND", "SHOW.BAR", "DELETE.MENU", "DELETE.COMMAND", "GET.CHART.ITEM", "DIALOG.BOX",
    /* 162 */ "CLEAN", "MDETERM", "MINVERSE", "MMULT", "FILES", "IPMT",
    /* 168 */ "PPMT", "COUNTA", "CANCEL.KEY", "FOR", "WHILE", "BREAK",
    /* 174 */ "NEXT", "INITIATE", "REQUEST", "POKE", "EXECUTE", "TERMINATE",
    /* 180 */ "RESTART", "HELP", "GET.BAR", "PRODUCT", "FACT", "GET.CELL",
    /* 186 */ "GET.WORKSPACE", "GET.WINDOW", "GET.DOCUMENT", "DPRODUCT", "ISNONTEXT", "GET.NOTE",
    /* 192 */ "NOTE", "STDEVP", "VARP", "DSTDEVP", "DVARP", "TRUNC",
    /* 198 */ "ISLOGICAL", "DCOUNTA", "DELETE.BAR", "UNREGISTER", "", "",
    /* 204 */ "USDOLLAR", "FINDB", "SEARCHB", "REPLACEB", "LEFTB", "RIGHTB",
    /* 210 */ "MIDB", "LENB", "ROUNDUP", "ROUNDDOWN", "ASC", "DBCS",
    /* 216 */ "RANK", "", "", "ADDRESS", "DAYS360", "TODAY",
    /* 222 */ "VDB", "ELSE", "ELSE.IF", "END.IF", "FOR.CELL", "MEDIAN",
    /* 228 */ "SUMPRODUCT", "SINH", "COSH", "TANH", "ASINH", "ACOSH",
    /* 234 */ "ATANH", "DGET", "CREATE.OBJECT", "VOLATILE", "LAST.ERROR", "CUSTOM.UNDO",
    /* 240 */ "CUSTOM.REPEAT", "FORMULA.CONVERT", "GET.LINK.INFO", "TEXT.BOX", "INFO", "GROUP",
    /* 246 */ "GET.OBJECT", "DB", "PAUSE", "", "", "RESUME",
    /* 252 */ "FREQUENCY", "ADD.TOOLBAR", "DELETE.TOOLBAR", "USER", "RESET.TOOLBAR", "EVALUATE",
    /* 258 */ "GET.TOOLBAR", "GET.TOOL", "SPELLING.CHECK", "ERROR.TYPE", "APP.TITLE", "WINDOW.TITLE",
    /* 264 */ "SAVE.TOOLBAR", "ENABLE.TOOL", "PRESS.TOOL", "REGISTER.ID", "GET.WORKBOOK", "AVEDEV",
    /* 270 */ "BETADIST", "GAMMALN", "BETAINV", "BINOMDIST", "CHIDIST", "CHIINV",
    /* 276 */ "COMBIN", "CONFIDENCE", "CRITBINOM", "EVEN", "EXPONDIST", "FDIST",
    /* 282 */ "FINV", "FISHER", "FISHERINV", "FLOOR", "GAMMADIST", "GAMMAINV",
    /* 288 */ "CEILING", "HYPGEOMDIST", "LOGNORMDIST", "LOGINV", "NEGBINOMDIST", "NORMDIST",
    /* 294 */ "NORMSDIST", "NORMINV", "NORMSINV", "STANDARDIZE", "ODD", "PERMUT",
    /* 300 */ "POISSON", "TDIST", "WEIBULL", "SUMXMY2", "SUMX2MY2", "SUMX2PY2",
    /* 306 */ "CHITEST", "CORREL", "COVAR", "FORECAST", "FTEST", "INTERCEPT",
    /* 312 */ "PEARSON", "RSQ", "STEYX", "SLOPE", "TTEST", "PROB",
    /* 318 */ "DEVSQ", "GEOMEAN", "HARMEAN", "SUMSQ", "KURT", "SKEW",
    /* 324 */ "ZTEST", "LARGE", "SMALL", "QUARTILE", "PERCENTILE", "PERCENTRANK",
    /* 330 */ "MODE", "TRIMMEAN", "TINV", "", "MOVIE.COMMAND", "GET.MOVIE",
    /* 336 */ "CONCATENATE", "POWER", "PIVOT.ADD.DATA", "GET.PIVOT.TABLE", "GET.PIVOT.FIELD", "GET.PIVOT.ITEM",
    /* 342 */ "RADIANS", "DEGREES", "SUBTOTAL", "SUMIF", "COUNTIF", "COUNTBLANK",
    /* 348 */ "SCENARIO.GET", "OPTIONS.LISTS.GET", "ISPMT", "DATEDIF", "DATESTRING", "NUMBERSTRING",
    /* 354 */ "ROMAN", "OPEN.DIALOG", "SAVE.DIALOG", "VIEW.GET", "GETPIVOTDATA", "HYPERLINK",
    /* 360 */ "PHONETIC", "AVERAGEA", "MAXA", "MINA", "STDEVPA", "VARPA",
    /* 366 */ "STDEVA", "VARA", "BAHTTEXT", "THAIDAYOFWEEK", "THAIDIGIT", "THAIMONTHOFYEAR",
    /* 372 */ "THAINUMSOUND", "THAINUMSTRING", "THAISTRINGLENGTH", "ISTHAIDIGIT", "ROUNDBAHTDOWN", "ROUNDBAHTUP",
    /* 378 */ "THAIYEAR", "RTD",
];

/// Look up the name of a built-in function.
pub fn function_name_from_id(iftab: u16) -> Option<&'static str> {
    FTAB.get(usize::from(iftab))
        .copied()
        .filter(|name| !name.is_empty())
}

/// Argument count implied by a `PtgFunc` token, or `None` for variable-arity functions.
pub fn fixed_arg_count(iftab: u16) -> Option<u8> {
    let argc = match iftab {
        10 | 19 | 34 | 35 | 63 | 74 | 221 => 0,
        2 | 3 | 15..=18 | 20..=26 | 32 | 33 | 38 | 67..=69 | 71..=73 | 75..=77 | 83 | 86 | 98
        | 99 | 105 | 111..=114 | 118 | 121 | 126..=131 | 140 | 141 | 162..=164 | 184 | 190
        | 198 | 211 | 214 | 215 | 229..=234 | 244 | 261 | 271 | 279 | 283 | 284 | 294 | 296
        | 298 | 342 | 343 | 347 | 352 | 360 | 368 => 1,
        27 | 30 | 39 | 48 | 79 | 97 | 117 | 165 | 212 | 213 | 252 | 274..=276 | 285 | 288
        | 299 | 303..=308 | 310..=315 | 325..=328 | 331 | 332 | 337 | 346 | 353 => 2,
        31 | 40..=45 | 47 | 61 | 65 | 66 | 142 | 189 | 195 | 196 | 199 | 235 | 277 | 278
        | 280..=282 | 287 | 290..=292 | 295 | 297 | 300 | 301 | 309 | 351 => 3,
        119 | 143 | 207 | 273 | 286 | 289 | 293 | 302 | 316 | 350 => 4,
        _ => return None,
    };
    Some(argc)
}
