//! Built-in project templates.
//!
//! Every template is a small, bug-free module plus a test file whose tests
//! pass against it. `coverage` maps each function to the test that exercises
//! it; the injector only places bugs in covered functions.

use crate::difficulty::Language;

/// A clean project skeleton bugs are injected into.
#[derive(Debug, Clone, Copy)]
pub struct ProjectTemplate {
    /// Stable template name.
    pub name: &'static str,
    pub language: Language,
    /// One-line summary used in task text.
    pub summary: &'static str,
    /// Source files as (path, content).
    pub sources: &'static [(&'static str, &'static str)],
    /// Test file path.
    pub test_path: &'static str,
    /// Test file content.
    pub test_source: &'static str,
    /// Every test name in the test file, in file order.
    pub tests: &'static [&'static str],
    /// Function name to the test that covers it.
    pub coverage: &'static [(&'static str, &'static str)],
}

impl ProjectTemplate {
    /// The test covering `function`, if any.
    pub fn test_for(&self, function: &str) -> Option<&'static str> {
        self.coverage
            .iter()
            .find(|(name, _)| *name == function)
            .map(|(_, test)| *test)
    }

    /// Whether `function` is exercised by a test.
    pub fn is_covered(&self, function: &str) -> bool {
        self.test_for(function).is_some()
    }
}

/// All built-in templates.
pub fn all_templates() -> &'static [ProjectTemplate] {
    TEMPLATES
}

/// Templates for one language.
pub fn templates_for(language: Language) -> Vec<&'static ProjectTemplate> {
    TEMPLATES.iter().filter(|t| t.language == language).collect()
}

/// Looks a template up by name.
pub fn find_template(name: &str) -> Option<&'static ProjectTemplate> {
    TEMPLATES.iter().find(|t| t.name == name)
}

static TEMPLATES: &[ProjectTemplate] = &[
    ProjectTemplate {
        name: "calculator",
        language: Language::Python,
        summary: "a small arithmetic calculator module",
        sources: &[("calculator.py", PY_CALCULATOR)],
        test_path: "test_calculator.py",
        test_source: PY_CALCULATOR_TESTS,
        tests: &[
            "test_add",
            "test_subtract",
            "test_multiply",
            "test_divide",
            "test_power",
            "test_average",
        ],
        coverage: &[
            ("add", "test_add"),
            ("subtract", "test_subtract"),
            ("multiply", "test_multiply"),
            ("divide", "test_divide"),
            ("power", "test_power"),
            ("average", "test_average"),
        ],
    },
    ProjectTemplate {
        name: "data_processor",
        language: Language::Python,
        summary: "list filtering and aggregation helpers",
        sources: &[("data_processor.py", PY_DATA_PROCESSOR)],
        test_path: "test_data_processor.py",
        test_source: PY_DATA_PROCESSOR_TESTS,
        tests: &[
            "test_filter_positive",
            "test_sum_even",
            "test_find_max",
            "test_running_total",
            "test_remove_duplicates",
        ],
        coverage: &[
            ("filter_positive", "test_filter_positive"),
            ("sum_even", "test_sum_even"),
            ("find_max", "test_find_max"),
            ("running_total", "test_running_total"),
            ("remove_duplicates", "test_remove_duplicates"),
        ],
    },
    ProjectTemplate {
        name: "string_utils",
        language: Language::Python,
        summary: "string manipulation utilities",
        sources: &[("string_utils.py", PY_STRING_UTILS)],
        test_path: "test_string_utils.py",
        test_source: PY_STRING_UTILS_TESTS,
        tests: &[
            "test_reverse_string",
            "test_is_palindrome",
            "test_count_vowels",
            "test_truncate",
            "test_repeat_word",
            "test_common_prefix",
        ],
        coverage: &[
            ("reverse_string", "test_reverse_string"),
            ("is_palindrome", "test_is_palindrome"),
            ("count_vowels", "test_count_vowels"),
            ("truncate", "test_truncate"),
            ("repeat_word", "test_repeat_word"),
            ("common_prefix", "test_common_prefix"),
        ],
    },
    ProjectTemplate {
        name: "algorithms",
        language: Language::Python,
        summary: "classic searching, sorting and recursion routines",
        sources: &[("algorithms.py", PY_ALGORITHMS)],
        test_path: "test_algorithms.py",
        test_source: PY_ALGORITHMS_TESTS,
        tests: &[
            "test_binary_search",
            "test_bubble_sort",
            "test_fibonacci",
            "test_factorial",
            "test_gcd",
        ],
        coverage: &[
            ("binary_search", "test_binary_search"),
            ("bubble_sort", "test_bubble_sort"),
            ("fibonacci", "test_fibonacci"),
            ("factorial", "test_factorial"),
            ("gcd", "test_gcd"),
        ],
    },
    ProjectTemplate {
        name: "loops",
        language: Language::Python,
        summary: "loop-based numeric helpers",
        sources: &[("main.py", PY_LOOPS)],
        test_path: "test_main.py",
        test_source: PY_LOOPS_TESTS,
        tests: &[
            "test_sum_to",
            "test_count_multiples",
            "test_clamp",
            "test_last_index",
            "test_safe_ratio",
        ],
        coverage: &[
            ("sum_to", "test_sum_to"),
            ("count_multiples", "test_count_multiples"),
            ("clamp", "test_clamp"),
            ("last_index", "test_last_index"),
            ("safe_ratio", "test_safe_ratio"),
        ],
    },
    ProjectTemplate {
        name: "utils",
        language: Language::JavaScript,
        summary: "general purpose JavaScript helpers",
        sources: &[("utils.js", JS_UTILS)],
        test_path: "test_utils.js",
        test_source: JS_UTILS_TESTS,
        tests: &[
            "test_add",
            "test_multiply",
            "test_is_even",
            "test_capitalize",
            "test_range",
        ],
        coverage: &[
            ("add", "test_add"),
            ("multiply", "test_multiply"),
            ("isEven", "test_is_even"),
            ("capitalize", "test_capitalize"),
            ("range", "test_range"),
        ],
    },
    ProjectTemplate {
        name: "array_ops",
        language: Language::JavaScript,
        summary: "array aggregation and slicing functions",
        sources: &[("array_ops.js", JS_ARRAY_OPS)],
        test_path: "test_array_ops.js",
        test_source: JS_ARRAY_OPS_TESTS,
        tests: &[
            "test_sum",
            "test_find_max",
            "test_last_item",
            "test_chunk",
            "test_count_above",
        ],
        coverage: &[
            ("sum", "test_sum"),
            ("findMax", "test_find_max"),
            ("lastItem", "test_last_item"),
            ("chunk", "test_chunk"),
            ("countAbove", "test_count_above"),
        ],
    },
    ProjectTemplate {
        name: "validators",
        language: Language::JavaScript,
        summary: "input validation helpers for sign-up forms",
        sources: &[("validators.js", JS_VALIDATORS)],
        test_path: "test_validators.js",
        test_source: JS_VALIDATORS_TESTS,
        tests: &[
            "test_is_valid_email",
            "test_is_valid_phone",
            "test_is_valid_password",
            "test_is_valid_username",
            "test_is_valid_zip",
        ],
        coverage: &[
            ("isValidEmail", "test_is_valid_email"),
            ("isValidPhone", "test_is_valid_phone"),
            ("isValidPassword", "test_is_valid_password"),
            ("isValidUsername", "test_is_valid_username"),
            ("isValidZip", "test_is_valid_zip"),
        ],
    },
];

const PY_CALCULATOR: &str = r#""""Simple calculator module."""


def add(a, b):
    """Add two numbers."""
    return a + b


def subtract(a, b):
    """Subtract b from a."""
    return a - b


def multiply(a, b):
    """Multiply two numbers."""
    return a * b


def divide(a, b):
    """Divide a by b."""
    if b == 0:
        raise ValueError("Cannot divide by zero")
    return a / b


def power(a, b):
    """Raise a to the power of b."""
    return pow(a, b)


def average(values):
    """Arithmetic mean of a non-empty list."""
    if not values:
        raise ValueError("average of empty list")
    return sum(values) / len(values)
"#;

const PY_CALCULATOR_TESTS: &str = r#"import pytest

from calculator import add, subtract, multiply, divide, power, average


def test_add():
    assert add(2, 3) == 5
    assert add(-1, 1) == 0


def test_subtract():
    assert subtract(5, 3) == 2
    assert subtract(0, 5) == -5


def test_multiply():
    assert multiply(4, 5) == 20
    assert multiply(-2, 3) == -6


def test_divide():
    assert divide(10, 2) == 5
    assert divide(7, 2) == 3.5
    with pytest.raises(ValueError):
        divide(5, 0)


def test_power():
    assert power(2, 3) == 8
    assert power(5, 0) == 1


def test_average():
    assert average([1, 2, 3]) == 2
    with pytest.raises(ValueError):
        average([])
"#;

const PY_DATA_PROCESSOR: &str = r#""""Data processing utilities."""


def filter_positive(numbers):
    """Keep only the strictly positive numbers."""
    return [n for n in numbers if n > 0]


def sum_even(numbers):
    """Sum all even numbers in a list."""
    return sum(n for n in numbers if n % 2 == 0)


def find_max(numbers):
    """Largest value, or None for an empty list."""
    if not numbers:
        return None
    return max(numbers)


def running_total(numbers):
    """Prefix sums of the input list."""
    totals = []
    current = 0
    for i in range(len(numbers)):
        current = current + numbers[i]
        totals.append(current)
    return totals


def remove_duplicates(items):
    """Remove duplicates while preserving order."""
    seen = set()
    result = []
    for item in items:
        if item not in seen:
            seen.add(item)
            result.append(item)
    return result
"#;

const PY_DATA_PROCESSOR_TESTS: &str = r#"from data_processor import (
    filter_positive,
    sum_even,
    find_max,
    running_total,
    remove_duplicates,
)


def test_filter_positive():
    assert filter_positive([-2, 0, 3, 5]) == [3, 5]
    assert filter_positive([]) == []


def test_sum_even():
    assert sum_even([1, 2, 3, 4, 5, 6]) == 12
    assert sum_even([1, 3]) == 0


def test_find_max():
    assert find_max([3, 9, 4]) == 9
    assert find_max([]) is None


def test_running_total():
    assert running_total([1, 2, 3]) == [1, 3, 6]
    assert running_total([]) == []


def test_remove_duplicates():
    assert remove_duplicates([1, 2, 1, 3, 2]) == [1, 2, 3]
"#;

const PY_STRING_UTILS: &str = r#""""String utility functions."""


def reverse_string(s):
    """Reverse a string."""
    return s[::-1]


def is_palindrome(s):
    """Check if a string is a palindrome, ignoring case and spaces."""
    cleaned = s.lower().replace(" ", "")
    return cleaned == cleaned[::-1]


def count_vowels(s):
    """Count vowels in a string."""
    vowels = "aeiouAEIOU"
    return sum(1 for char in s if char in vowels)


def truncate(s, limit):
    """Cut s to at most limit characters, appending an ellipsis when shortened."""
    if len(s) <= limit:
        return s
    return s[:limit] + "..."


def repeat_word(word, times):
    """Repeat word separated by single spaces."""
    return " ".join([word] * times)


def common_prefix(a, b):
    """Longest common prefix of two strings."""
    i = 0
    while i < len(a) and i < len(b) and a[i] == b[i]:
        i += 1
    return a[:i]
"#;

const PY_STRING_UTILS_TESTS: &str = r#"from string_utils import (
    reverse_string,
    is_palindrome,
    count_vowels,
    truncate,
    repeat_word,
    common_prefix,
)


def test_reverse_string():
    assert reverse_string("hello") == "olleh"


def test_is_palindrome():
    assert is_palindrome("Never odd or even")
    assert not is_palindrome("python")


def test_count_vowels():
    assert count_vowels("Programming") == 3


def test_truncate():
    assert truncate("hello", 5) == "hello"
    assert truncate("hello world", 5) == "hello..."


def test_repeat_word():
    assert repeat_word("ha", 3) == "ha ha ha"


def test_common_prefix():
    assert common_prefix("flower", "flow") == "flow"
    assert common_prefix("dog", "cat") == ""
"#;

const PY_ALGORITHMS: &str = r#""""Algorithm implementations."""


def binary_search(arr, target):
    """Index of target in sorted arr, or -1 when absent."""
    left, right = 0, len(arr) - 1
    while left <= right:
        mid = (left + right) // 2
        if arr[mid] == target:
            return mid
        elif arr[mid] < target:
            left = mid+1
        else:
            right = mid-1
    return -1


def bubble_sort(arr):
    """Sort a list in place using bubble sort and return it."""
    n = len(arr)
    for i in range(n):
        for j in range(0, n - i - 1):
            if arr[j] > arr[j+1]:
                arr[j], arr[j+1] = arr[j+1], arr[j]
    return arr


def fibonacci(n):
    """Return the nth Fibonacci number."""
    a, b = 0, 1
    for _ in range(n):
        a, b = b, a + b
    return a


def factorial(n):
    """Return n factorial."""
    if n == 0:
        return 1
    return n * factorial(n - 1)


def gcd(a, b):
    """Greatest common divisor via Euclid's algorithm."""
    while b:
        a, b = b, a % b
    return a
"#;

const PY_ALGORITHMS_TESTS: &str = r#"from algorithms import binary_search, bubble_sort, fibonacci, factorial, gcd


def test_binary_search():
    assert binary_search([1, 2, 3, 4, 5], 3) == 2
    assert binary_search([1, 3, 5, 7, 9], 7) == 3
    assert binary_search([1], 1) == 0
    assert binary_search([1, 2, 3, 4, 5], 6) == -1


def test_bubble_sort():
    assert bubble_sort([3, 1, 4, 1, 5]) == [1, 1, 3, 4, 5]


def test_fibonacci():
    assert fibonacci(0) == 0
    assert fibonacci(2) == 1
    assert fibonacci(10) == 55


def test_factorial():
    assert factorial(0) == 1
    assert factorial(5) == 120


def test_gcd():
    assert gcd(48, 18) == 6
"#;

const PY_LOOPS: &str = r#""""Loop-based numeric helpers."""


def sum_to(n):
    """Return the sum of 0..n inclusive."""
    total = 0
    for i in range(n+1):
        total += i
    return total


def count_multiples(values, k):
    """Count how many values are divisible by k."""
    count = 0
    for value in values:
        if value % k == 0:
            count += 1
    return count


def clamp(value, low, high):
    """Clamp value into the closed interval [low, high]."""
    if value < low:
        return low
    if value > high:
        return high
    return value


def last_index(items):
    """Index of the last element, or None for an empty list."""
    if not items:
        return None
    return len(items) - 1


def safe_ratio(a, b):
    """a / b, or None when b is zero."""
    if b == 0:
        return None
    return a / b
"#;

const PY_LOOPS_TESTS: &str = r#"from main import sum_to, count_multiples, clamp, last_index, safe_ratio


def test_sum_to():
    assert sum_to(0) == 0
    assert sum_to(3) == 6
    assert sum_to(10) == 55


def test_count_multiples():
    assert count_multiples([1, 2, 3, 4, 6], 2) == 3
    assert count_multiples([], 3) == 0


def test_clamp():
    assert clamp(5, 0, 10) == 5
    assert clamp(-3, 0, 10) == 0
    assert clamp(42, 0, 10) == 10


def test_last_index():
    assert last_index([7, 8, 9]) == 2
    assert last_index([]) is None


def test_safe_ratio():
    assert safe_ratio(6, 3) == 2
    assert safe_ratio(1, 0) is None
"#;

const JS_UTILS: &str = r#"// Utility functions

function add(a, b) {
    return a + b;
}

function multiply(a, b) {
    return a * b;
}

function isEven(n) {
    return n % 2 === 0;
}

function capitalize(str) {
    return str.charAt(0).toUpperCase() + str.slice(1);
}

function range(start, end) {
    const result = [];
    for (let i = start; i <= end; i++) {
        result.push(i);
    }
    return result;
}

module.exports = { add, multiply, isEven, capitalize, range };
"#;

const JS_UTILS_TESTS: &str = r#"const { add, multiply, isEven, capitalize, range } = require("./utils");

let failures = 0;

function assertEquals(actual, expected) {
    const same = typeof expected === "object" && expected !== null
        ? JSON.stringify(actual) === JSON.stringify(expected)
        : Object.is(actual, expected);
    if (!same) {
        throw new Error(`expected ${JSON.stringify(expected)}, got ${String(actual)}`);
    }
}

function check(name, fn) {
    try {
        fn();
        console.log(`PASS ${name}`);
    } catch (e) {
        failures += 1;
        console.log(`FAIL ${name}: ${e.message}`);
    }
}

check("test_add", () => {
    assertEquals(add(2, 3), 5);
    assertEquals(add(-1, 1), 0);
});

check("test_multiply", () => {
    assertEquals(multiply(4, 5), 20);
    assertEquals(multiply(0, 7), 0);
});

check("test_is_even", () => {
    assertEquals(isEven(4), true);
    assertEquals(isEven(7), false);
});

check("test_capitalize", () => {
    assertEquals(capitalize("hello"), "Hello");
});

check("test_range", () => {
    assertEquals(range(1, 5), [1, 2, 3, 4, 5]);
});

if (failures > 0) {
    process.exit(1);
}
"#;

const JS_ARRAY_OPS: &str = r#"// Array operation functions

function sum(arr) {
    return arr.reduce((a, b) => a + b, 0);
}

function findMax(arr) {
    if (arr.length === 0) return null;
    return Math.max(...arr);
}

function lastItem(arr) {
    return arr[arr.length - 1];
}

function chunk(arr, size) {
    const result = [];
    for (let i = 0; i < arr.length; i += size) {
        result.push(arr.slice(i, i + size));
    }
    return result;
}

function countAbove(arr, threshold) {
    let count = 0;
    for (const value of arr) {
        if (value > threshold) {
            count += 1;
        }
    }
    return count;
}

module.exports = { sum, findMax, lastItem, chunk, countAbove };
"#;

const JS_ARRAY_OPS_TESTS: &str = r#"const { sum, findMax, lastItem, chunk, countAbove } = require("./array_ops");

let failures = 0;

function assertEquals(actual, expected) {
    const same = typeof expected === "object" && expected !== null
        ? JSON.stringify(actual) === JSON.stringify(expected)
        : Object.is(actual, expected);
    if (!same) {
        throw new Error(`expected ${JSON.stringify(expected)}, got ${String(actual)}`);
    }
}

function check(name, fn) {
    try {
        fn();
        console.log(`PASS ${name}`);
    } catch (e) {
        failures += 1;
        console.log(`FAIL ${name}: ${e.message}`);
    }
}

check("test_sum", () => {
    assertEquals(sum([1, 2, 3, 4, 5]), 15);
});

check("test_find_max", () => {
    assertEquals(findMax([1, 5, 3]), 5);
    assertEquals(findMax([]), null);
});

check("test_last_item", () => {
    assertEquals(lastItem([1, 2, 3]), 3);
});

check("test_chunk", () => {
    assertEquals(chunk([1, 2, 3, 4], 2), [[1, 2], [3, 4]]);
    assertEquals(chunk([1, 2, 3, 4, 5], 2), [[1, 2], [3, 4], [5]]);
});

check("test_count_above", () => {
    assertEquals(countAbove([1, 5, 10], 4), 2);
});

if (failures > 0) {
    process.exit(1);
}
"#;

const JS_VALIDATORS: &str = r#"// Validation functions

function isValidEmail(email) {
    const at = email.indexOf("@");
    const dot = email.lastIndexOf(".");
    if (at < 1 || dot < at + 2) {
        return false;
    }
    return dot < email.length - 1 && !email.includes(" ");
}

function isValidPhone(phone) {
    const parts = phone.split("-");
    if (parts.length !== 3) {
        return false;
    }
    const sizes = [3, 3, 4];
    return parts.every((part, i) => part.length === sizes[i] && /^\d+$/.test(part));
}

function isValidPassword(password) {
    return password.length >= 8;
}

function isValidUsername(username) {
    if (username.length < 3 || username.length > 20) {
        return false;
    }
    return /^\w+$/.test(username);
}

function isValidZip(zip) {
    return zip.length === 5 && /^\d+$/.test(zip);
}

module.exports = { isValidEmail, isValidPhone, isValidPassword, isValidUsername, isValidZip };
"#;

const JS_VALIDATORS_TESTS: &str = r#"const {
    isValidEmail,
    isValidPhone,
    isValidPassword,
    isValidUsername,
    isValidZip,
} = require("./validators");

let failures = 0;

function assertEquals(actual, expected, label) {
    if (actual !== expected) {
        throw new Error(`${label}: expected ${expected}, got ${actual}`);
    }
}

function check(name, fn) {
    try {
        fn();
        console.log(`PASS ${name}`);
    } catch (e) {
        failures += 1;
        console.log(`FAIL ${name}: ${e.message}`);
    }
}

check("test_is_valid_email", () => {
    assertEquals(isValidEmail("user@example.com"), true, "valid email");
    assertEquals(isValidEmail("invalid"), false, "missing @");
    assertEquals(isValidEmail("user@.com"), false, "empty domain");
    assertEquals(isValidEmail("user@example."), false, "empty tld");
    assertEquals(isValidEmail("us er@example.com"), false, "space");
});

check("test_is_valid_phone", () => {
    assertEquals(isValidPhone("123-456-7890"), true, "valid phone");
    assertEquals(isValidPhone("1234567890"), false, "no dashes");
    assertEquals(isValidPhone("12-3456-7890"), false, "wrong grouping");
    assertEquals(isValidPhone("abc-def-ghij"), false, "letters");
});

check("test_is_valid_password", () => {
    assertEquals(isValidPassword("password123"), true, "valid password");
    assertEquals(isValidPassword("abcdefgh"), true, "exactly eight");
    assertEquals(isValidPassword("short"), false, "too short");
});

check("test_is_valid_username", () => {
    assertEquals(isValidUsername("user_123"), true, "valid username");
    assertEquals(isValidUsername("abc"), true, "shortest");
    assertEquals(isValidUsername("ab"), false, "too short");
    assertEquals(isValidUsername("a".repeat(21)), false, "too long");
    assertEquals(isValidUsername("bad name"), false, "space");
});

check("test_is_valid_zip", () => {
    assertEquals(isValidZip("12345"), true, "valid zip");
    assertEquals(isValidZip("1234"), false, "too short");
    assertEquals(isValidZip("12a45"), false, "letter");
});

if (failures > 0) {
    process.exit(1);
}
"#;
